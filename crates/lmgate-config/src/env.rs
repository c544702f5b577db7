//! Typed reads of environment variables.
//!
//! A missing or empty variable reads as `None`. A present but unparseable or
//! out-of-range value also reads as `None` after a warning, so the caller's
//! default applies and startup never aborts on a typo.

use std::str::FromStr;

use tracing::warn;

pub struct EnvSource<F> {
    lookup: F,
}

impl EnvSource<fn(&str) -> Option<String>> {
    /// Reads from the process environment.
    pub fn process() -> Self {
        fn lookup(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }
        Self { lookup }
    }
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }

    /// First non-empty value among `names`.
    pub fn first_string(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.string(name))
    }

    pub fn parsed<T>(&self, name: &str) -> Option<T>
    where
        T: FromStr,
    {
        let value = self.string(name)?;
        match value.trim().parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(variable = name, value = %value, "invalid value; using default");
                None
            }
        }
    }

    /// Like [`parsed`](Self::parsed), but also drops values failing `valid`.
    /// `expected` names the accepted range in the warning.
    pub fn parsed_if<T>(&self, name: &str, expected: &str, valid: impl Fn(&T) -> bool) -> Option<T>
    where
        T: FromStr,
    {
        let value = self.parsed::<T>(name)?;
        if valid(&value) {
            return Some(value);
        }
        warn!(
            variable = name,
            value = %self.string(name).unwrap_or_default(),
            expected,
            "out-of-range value; using default"
        );
        None
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        let value = self.string(name)?;
        match parse_bool(&value) {
            Some(parsed) => Some(parsed),
            None => {
                warn!(variable = name, value = %value, "invalid value; using default");
                None
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
