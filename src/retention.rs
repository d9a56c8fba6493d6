use std::cmp::Reverse;
use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use semver::Version;

use crate::error::AppError;
use crate::models::DetailedTag;

pub const DEFAULT_KEEP_REGEX: &str = ".*";
pub const DEFAULT_DELETE_REGEX: &str = "^$";

/// Largest accepted `--older-than`, about a century
pub const MAX_OLDER_THAN_DAYS: u64 = 36_500;

/// How tags are ranked before the most-recent ones are reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    /// By creation timestamp, newest first
    Created,
    /// By the version coerced from the tag name, newest first
    Version,
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub keep: Regex,
    pub delete: Regex,
    /// Minimum age in days; `None` disables the age check
    pub older_than_days: Option<u64>,
    pub keep_most_recent: usize,
}

/// The tags split into those to delete and those that stay
#[derive(Debug, Default)]
pub struct Selection {
    pub to_delete: Vec<DetailedTag>,
    pub to_keep: Vec<DetailedTag>,
}

impl RetentionPolicy {
    pub fn new(
        keep: &str,
        delete: &str,
        older_than_days: Option<u64>,
        keep_most_recent: usize,
    ) -> Result<Self, AppError> {
        Ok(Self {
            keep: Regex::new(keep)?,
            delete: Regex::new(delete)?,
            older_than_days,
            keep_most_recent,
        })
    }

    /// Decide which tags to delete.
    ///
    /// With [`Recency::Version`] the timestamps are not trusted, so the age
    /// check is skipped altogether.
    pub fn apply(&self, mut tags: Vec<DetailedTag>, recency: Recency, now: DateTime<Utc>) -> Selection {
        match recency {
            Recency::Created => tags.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            Recency::Version => sort_by_version(&mut tags),
        }

        let reserved = self.keep_most_recent.min(tags.len());
        let mut to_keep: Vec<DetailedTag> = tags.drain(..reserved).collect();

        let cutoff = match (recency, self.older_than_days) {
            (Recency::Created, Some(days)) => Some(age_cutoff(now, days)),
            _ => None,
        };

        let mut to_delete = Vec::new();
        for tag in tags {
            // An unrepresentable cutoff lies before any timestamp: nothing is old enough.
            let old_enough = match cutoff {
                None => true,
                Some(cutoff) => cutoff.is_some_and(|cutoff| tag.created_at <= cutoff),
            };
            let selected = !self.keep.is_match(&tag.name) && self.delete.is_match(&tag.name) && old_enough;

            if selected {
                to_delete.push(tag);
            } else {
                to_keep.push(tag);
            }
        }

        Selection { to_delete, to_keep }
    }
}

/// Latest creation time that is at least `days` old, if chrono can represent it.
fn age_cutoff(now: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_days(i64::try_from(days).ok()?)?;
    now.checked_sub_signed(delta)
}

/// Coercible tags first, newest version first; the rest alphabetically.
pub fn sort_by_version(tags: &mut [DetailedTag]) {
    tags.sort_by_cached_key(|tag| {
        let version = coerce_version(&tag.name);
        (version.is_none(), Reverse(version), tag.name.clone())
    });
}

/// Pull the first `MAJOR[.MINOR[.PATCH]]` out of a tag name.
pub fn coerce_version(name: &str) -> Option<Version> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("version regex")
    });

    let caps = re.captures(name)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}
