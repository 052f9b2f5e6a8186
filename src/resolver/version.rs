// SPDX-License-Identifier: GPL-3.0-only
use regex::Regex;
use semver::Prerelease;
use std::cmp::Ordering;
use std::sync::LazyLock;

// v?N(.N)* [sep pre-release] [+build]
// A tag after `.` or no separator must start with a letter, otherwise the
// release digits could be read as the tag. Tags end alphanumeric.
static VERSION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[vV]?(\d+(?:\.\d+)*)",
        r"(?:[-_]([0-9A-Za-z](?:[0-9A-Za-z.-]*[0-9A-Za-z])?)|\.?([A-Za-z](?:[0-9A-Za-z.-]*[0-9A-Za-z])?))?",
        r"(?:\+[0-9A-Za-z.-]+)?$",
    ))
    .expect("version pattern compiles")
});

/// A version-like directory or package version name.
///
/// Release components compare numerically with missing components as zero,
/// a release outranks its own pre-releases, and build metadata is ignored.
#[derive(Debug, Clone)]
pub struct ManifestVersion {
    release: Vec<u64>,
    pre: Prerelease,
}

impl ManifestVersion {
    /// `None` when `name` is not version-like
    pub fn parse(name: &str) -> Option<Self> {
        let captures = VERSION_NAME.captures(name.trim())?;

        let release = captures[1]
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let pre = match captures.get(2).or_else(|| captures.get(3)) {
            Some(tag) => Prerelease::new(tag.as_str()).ok()?,
            None => Prerelease::EMPTY,
        };

        Some(Self { release, pre })
    }

    fn cmp_release(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (0..len)
            .map(|i| {
                let a = self.release.get(i).copied().unwrap_or(0);
                let b = other.release.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Ord for ManifestVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_release(other).then_with(|| {
            match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            }
        })
    }
}

impl PartialOrd for ManifestVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ManifestVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ManifestVersion {}

/// Highest version-like item of `items`; on ties the later item wins.
pub fn latest_by<'a, T, F>(items: &'a [T], name: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    items
        .iter()
        .filter_map(|item| ManifestVersion::parse(name(item)).map(|v| (item, v)))
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(item, _)| item)
}
