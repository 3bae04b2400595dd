#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Era {
    pub name: &'static str,
    pub abbreviation: char,
    /// Gregorian year in which relative year 1 begins.
    pub start_year: i32,
    /// Last valid relative year, inclusive.
    pub max_relative_year: u32,
}

impl Era {
    pub fn contains(&self, relative_year: u32) -> bool {
        (1..=self.max_relative_year).contains(&relative_year)
    }

    pub fn gregorian_year(&self, relative_year: u32) -> i32 {
        self.start_year + relative_year as i32 - 1
    }
}

// Newest first.
pub const ERAS: [Era; 5] = [
    Era {
        name: "令和",
        abbreviation: 'R',
        start_year: 2019,
        max_relative_year: 100,
    },
    Era {
        name: "平成",
        abbreviation: 'H',
        start_year: 1989,
        max_relative_year: 31,
    },
    Era {
        name: "昭和",
        abbreviation: 'S',
        start_year: 1926,
        max_relative_year: 64,
    },
    Era {
        name: "大正",
        abbreviation: 'T',
        start_year: 1912,
        max_relative_year: 15,
    },
    Era {
        name: "明治",
        abbreviation: 'M',
        start_year: 1868,
        max_relative_year: 45,
    },
];

pub fn find_by_name(name: &str) -> Option<&'static Era> {
    ERAS.iter().find(|era| era.name == name)
}

pub fn find_by_abbreviation(code: char) -> Option<&'static Era> {
    let code = code.to_ascii_uppercase();
    ERAS.iter().find(|era| era.abbreviation == code)
}
