#![forbid(unsafe_code)]

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    New,
    CorrectedOrRevised,
    Deleted,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "marc:New",
            Self::CorrectedOrRevised => "marc:CorrectedOrRevised",
            Self::Deleted => "marc:Deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "marc:New" => Some(Self::New),
            "marc:CorrectedOrRevised" => Some(Self::CorrectedOrRevised),
            "marc:Deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
