use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Module version: `major.minor.micro[.qualifier]`, missing parts default to zero
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, &self.qualifier).cmp(&(
            other.major,
            other.minor,
            other.micro,
            &other.qualifier,
        ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty version".to_string());
        }

        let mut parts = s.splitn(4, '.');
        let mut number = |label: &str| -> Result<u32, String> {
            match parts.next() {
                Some(p) => p
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid {label} component in version: {s}")),
                None => Ok(0),
            }
        };
        let major = number("major")?;
        let minor = number("minor")?;
        let micro = number("micro")?;
        let qualifier = parts.next().unwrap_or_default().to_string();

        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("Invalid qualifier in version: {s}"));
        }

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// Interval of versions, written `[1.0.0, 2.0.0)`; a bare version means "at least"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Option<(Version, bool)>,
}

impl VersionRange {
    /// Range matching exactly one version
    pub fn exact(version: &Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: Some((version.clone(), true)),
        }
    }

    pub fn at_least(version: &Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: None,
        }
    }

    /// Range matching every version
    pub fn any() -> Self {
        Self::at_least(&Version::default())
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            version >= &self.floor
        } else {
            version > &self.floor
        };
        let below_ceiling = match &self.ceiling {
            Some((ceiling, true)) => version <= ceiling,
            Some((ceiling, false)) => version < ceiling,
            None => true,
        };
        above_floor && below_ceiling
    }

    pub fn is_exact(&self) -> bool {
        matches!(
            &self.ceiling,
            Some((ceiling, true)) if self.floor_inclusive && *ceiling == self.floor
        )
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some((ceiling, inclusive)) => write!(
                f,
                "{}{}, {}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if *inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(open) = s.chars().next() else {
            return Ok(Self::any());
        };

        if open != '[' && open != '(' {
            return Ok(Self::at_least(&s.parse()?));
        }

        let floor_inclusive = open == '[';
        let ceiling_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(format!("Unterminated version range: {s}")),
        };

        let body = &s[1..s.len() - 1];
        let (floor, ceiling) = body
            .split_once(',')
            .ok_or_else(|| format!("Version range needs two bounds: {s}"))?;
        let floor: Version = floor.parse()?;
        let ceiling: Version = ceiling.parse()?;

        if ceiling < floor {
            return Err(format!("Version range is empty: {s}"));
        }

        Ok(Self {
            floor,
            floor_inclusive,
            ceiling: Some((ceiling, ceiling_inclusive)),
        })
    }
}

impl TryFrom<String> for VersionRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}
