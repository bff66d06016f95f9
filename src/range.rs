use std::fmt;
use std::str::FromStr;

/// Chapter selection applied to each listed page.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ChapterFilter {
    #[default]
    All,
    /// Exact float equality on the parsed chapter number.
    Exact(f64),
    /// Inclusive on both ends.
    Range { from: f64, to: f64 },
}

impl ChapterFilter {
    pub fn new(from: Option<f64>, to: Option<f64>) -> Self {
        match (from, to) {
            (Some(from), Some(to)) => Self::Range { from, to },
            (Some(from), None) => Self::Exact(from),
            // An upper bound alone is not part of the listing contract.
            (None, _) => Self::All,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::All)
    }

    /// Records with no parseable number pass only when no filter is active.
    pub fn matches(&self, chapter_number: Option<&str>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(number) = chapter_number.and_then(parse_chapter_number) else {
            return false;
        };
        match *self {
            Self::All => true,
            Self::Exact(value) => number == value,
            Self::Range { from, to } => from <= number && number <= to,
        }
    }
}

impl FromStr for ChapterFilter {
    type Err = anyhow::Error;

    /// Accepts `<number>` or `<number>-<number>`; empty input selects everything.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::All);
        }

        match input.split_once('-') {
            Some((from, to)) => {
                let from = parse_bound(from)?;
                let to = parse_bound(to)?;
                if from > to {
                    anyhow::bail!("chapter range start {from} exceeds end {to}");
                }
                Ok(Self::Range { from, to })
            }
            None => Ok(Self::Exact(parse_bound(input)?)),
        }
    }
}

impl fmt::Display for ChapterFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Exact(value) => write!(f, "{value}"),
            Self::Range { from, to } => write!(f, "{from}-{to}"),
        }
    }
}

fn parse_bound(raw: &str) -> anyhow::Result<f64> {
    parse_chapter_number(raw).ok_or_else(|| anyhow::anyhow!("invalid chapter number: {raw:?}"))
}

pub fn parse_chapter_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
