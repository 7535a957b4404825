//! Package version ordering per ecosystem grammar
//!
//! [`compare`] picks the grammar from the host family. Versions of
//! different families are never compared against each other.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use vigil_core::domain::Family;
use vigil_core::{DetectionError, ParseError};

/// Version grammar of a package ecosystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGrammar {
    /// dpkg `epoch:upstream-revision`
    Debian,
    /// apk `1.2.3a_rc1-r0`
    Alpine,
    /// rpm `epoch:version-release`
    Rpm,
    /// rpm after CentOS release suffix normalization
    RpmRhel,
}

impl VersionGrammar {
    pub fn for_family(family: Family) -> Result<Self, DetectionError> {
        match family {
            Family::Debian | Family::Ubuntu | Family::Raspbian => Ok(Self::Debian),
            Family::Alpine => Ok(Self::Alpine),
            Family::Oracle | Family::Amazon | Family::SuseEnterpriseServer => Ok(Self::Rpm),
            Family::RedHat | Family::CentOS => Ok(Self::RpmRhel),
            Family::FreeBsd | Family::Windows | Family::Pseudo => {
                Err(DetectionError::UnsupportedFamily {
                    family: family.to_string(),
                    reason: "no package version grammar is registered".to_string(),
                })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Debian => "dpkg",
            Self::Alpine => "apk",
            Self::Rpm | Self::RpmRhel => "rpm",
        }
    }

    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, ParseError> {
        match self {
            Self::Debian => Ok(DebVersion::parse(a)?.cmp(&DebVersion::parse(b)?)),
            Self::Alpine => Ok(apk_compare(&apk_tokens(a)?, &apk_tokens(b)?)),
            Self::Rpm => Ok(RpmVersion::parse(a)?.cmp(&RpmVersion::parse(b)?)),
            Self::RpmRhel => Ok(RpmVersion::parse(&normalize_centos(a))?
                .cmp(&RpmVersion::parse(&normalize_centos(b))?)),
        }
    }

    pub fn less_than(&self, a: &str, b: &str) -> Result<bool, ParseError> {
        Ok(self.compare(a, b)? == Ordering::Less)
    }
}

/// Compare two versions with the grammar of `family`
pub fn compare(family: Family, a: &str, b: &str) -> Result<Ordering, DetectionError> {
    Ok(VersionGrammar::for_family(family)?.compare(a, b)?)
}

static CENTOS_RELEASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.[es]l(\d+)(?:_\d+)?(?:\.centos)?").expect("static regex is valid")
});

/// Rewrite CentOS release suffixes to the RHEL form, `.el8_4.centos` to `.el8`
pub fn normalize_centos(version: &str) -> String {
    CENTOS_RELEASE.replace_all(version, ".el$1").into_owned()
}

// dpkg

#[derive(Debug, Clone, PartialEq, Eq)]
struct DebVersion {
    epoch: u64,
    upstream: String,
    revision: String,
}

impl DebVersion {
    fn parse(input: &str) -> Result<Self, ParseError> {
        let malformed = |reason: &str| ParseError::malformed_version("dpkg", input, reason);
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(malformed("version is empty"));
        }

        let (epoch, rest) = match trimmed.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u64>()
                    .map_err(|_| malformed("epoch is not a number"))?;
                (epoch, rest)
            }
            None => (0, trimmed),
        };

        let (upstream, revision) = match rest.rfind('-') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(malformed("upstream version must start with a digit"));
        }
        if !upstream
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~' | '-' | ':'))
        {
            return Err(malformed("invalid character in upstream version"));
        }
        if !revision
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~'))
        {
            return Err(malformed("invalid character in revision"));
        }

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.to_string(),
        })
    }
}

impl Ord for DebVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| verrevcmp(&self.revision, &other.revision))
    }
}

impl PartialOrd for DebVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn deb_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn is_digit_at(s: &[u8], i: usize) -> bool {
    s.get(i).is_some_and(u8::is_ascii_digit)
}

/// dpkg's verrevcmp: `~` sorts before everything, letters before other symbols
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !is_digit_at(a, i)) || (j < b.len() && !is_digit_at(b, j)) {
            let ac = if is_digit_at(a, i) { 0 } else { deb_order(a.get(i).copied()) };
            let bc = if is_digit_at(b, j) { 0 } else { deb_order(b.get(j).copied()) };
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit_at(a, i) && is_digit_at(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if is_digit_at(a, i) {
            return Ordering::Greater;
        }
        if is_digit_at(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

// rpm

#[derive(Debug, Clone, PartialEq, Eq)]
struct RpmVersion {
    epoch: u64,
    version: String,
    release: String,
}

impl RpmVersion {
    fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseError::malformed_version("rpm", input, "version is empty"));
        }

        let (epoch, rest) = match trimmed.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch.parse::<u64>().map_err(|_| {
                    ParseError::malformed_version("rpm", input, "epoch is not a number")
                })?;
                (epoch, rest)
            }
            None => (0, trimmed),
        };

        let (version, release) = match rest.rfind('-') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        Ok(Self {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        })
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_rpm_separator(c: u8) -> bool {
    !c.is_ascii_alphanumeric() && c != b'~' && c != b'^'
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |s: &[u8]| -> usize { s.iter().take_while(|c| **c == b'0').count() };
    let (a, b) = (&a[strip(a)..], &b[strip(b)..]);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// rpm's segment-wise comparison with `~` (pre-release) and `^` (post-release)
fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());

    loop {
        while let Some(&c) = a.first()
            && is_rpm_separator(c)
        {
            a = &a[1..];
        }
        while let Some(&c) = b.first()
            && is_rpm_separator(c)
        {
            b = &b[1..];
        }

        let (a_tilde, b_tilde) = (a.first() == Some(&b'~'), b.first() == Some(&b'~'));
        if a_tilde || b_tilde {
            if !a_tilde {
                return Ordering::Greater;
            }
            if !b_tilde {
                return Ordering::Less;
            }
            a = &a[1..];
            b = &b[1..];
            continue;
        }

        let (a_caret, b_caret) = (a.first() == Some(&b'^'), b.first() == Some(&b'^'));
        if a_caret || b_caret {
            if a.is_empty() {
                return Ordering::Less;
            }
            if b.is_empty() {
                return Ordering::Greater;
            }
            if !a_caret {
                return Ordering::Greater;
            }
            if !b_caret {
                return Ordering::Less;
            }
            a = &a[1..];
            b = &b[1..];
            continue;
        }

        if a.is_empty() || b.is_empty() {
            break;
        }

        let numeric = a[0].is_ascii_digit();
        let take = |s: &[u8]| -> usize {
            s.iter()
                .take_while(|c| {
                    if numeric {
                        c.is_ascii_digit()
                    } else {
                        c.is_ascii_alphabetic()
                    }
                })
                .count()
        };
        let (a_len, b_len) = (take(a), take(b));
        let (a_seg, b_seg) = (&a[..a_len], &b[..b_len]);

        // Numeric segments are newer than alphabetic ones
        if b_seg.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            compare_numeric(a_seg, b_seg)
        } else {
            a_seg.cmp(b_seg)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }

        a = &a[a_len..];
        b = &b[b_len..];
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

// apk

/// Lexical element of an apk version, in token order of the version grammar
#[derive(Debug, Clone, PartialEq, Eq)]
enum ApkToken {
    Digit { value: String, first: bool },
    Letter(u8),
    Suffix { rank: i8, number: u64 },
    Revision(u64),
    End,
}

impl ApkToken {
    /// Tokens of a lower kind sort as newer when the sequences diverge
    fn kind(&self) -> u8 {
        match self {
            Self::Digit { .. } => 0,
            Self::Letter(_) => 1,
            Self::Suffix { .. } => 2,
            Self::Revision(_) => 3,
            Self::End => 4,
        }
    }

    fn is_pre_release(&self) -> bool {
        matches!(self, Self::Suffix { rank, .. } if *rank < 0)
    }
}

const APK_SUFFIXES: [(&str, i8); 9] = [
    ("alpha", -4),
    ("beta", -3),
    ("pre", -2),
    ("rc", -1),
    ("cvs", 1),
    ("svn", 2),
    ("git", 3),
    ("hg", 4),
    ("p", 5),
];

fn apk_tokens(input: &str) -> Result<Vec<ApkToken>, ParseError> {
    let malformed = |reason: &str| ParseError::malformed_version("apk", input, reason);
    let s = input.trim().as_bytes();
    let mut i = 0;
    let mut tokens = Vec::new();

    let digits = |i: &mut usize| -> Option<String> {
        let start = *i;
        while is_digit_at(s, *i) {
            *i += 1;
        }
        (start != *i).then(|| String::from_utf8_lossy(&s[start..*i]).into_owned())
    };

    let first = digits(&mut i).ok_or_else(|| malformed("version must start with a digit"))?;
    tokens.push(ApkToken::Digit {
        value: first,
        first: true,
    });
    while s.get(i) == Some(&b'.') {
        i += 1;
        let value = digits(&mut i).ok_or_else(|| malformed("expected digits after '.'"))?;
        tokens.push(ApkToken::Digit {
            value,
            first: false,
        });
    }

    if let Some(&c) = s.get(i)
        && c.is_ascii_lowercase()
    {
        tokens.push(ApkToken::Letter(c));
        i += 1;
    }

    while s.get(i) == Some(&b'_') {
        i += 1;
        let start = i;
        while s.get(i).is_some_and(u8::is_ascii_lowercase) {
            i += 1;
        }
        let name = std::str::from_utf8(&s[start..i]).unwrap_or_default();
        let rank = APK_SUFFIXES
            .iter()
            .find(|(suffix, _)| *suffix == name)
            .map(|(_, rank)| *rank)
            .ok_or_else(|| malformed("unknown suffix"))?;
        let number = match digits(&mut i) {
            Some(n) => n.parse().map_err(|_| malformed("suffix number overflows"))?,
            None => 0,
        };
        tokens.push(ApkToken::Suffix { rank, number });
    }

    if s.get(i) == Some(&b'-') {
        if s.get(i + 1) != Some(&b'r') {
            return Err(malformed("expected -r revision"));
        }
        i += 2;
        let revision = digits(&mut i).ok_or_else(|| malformed("expected revision number"))?;
        tokens.push(ApkToken::Revision(
            revision
                .parse()
                .map_err(|_| malformed("revision overflows"))?,
        ));
    }

    if i != s.len() {
        return Err(malformed("unexpected trailing characters"));
    }
    tokens.push(ApkToken::End);
    Ok(tokens)
}

fn apk_compare(a: &[ApkToken], b: &[ApkToken]) -> Ordering {
    for (at, bt) in a.iter().zip(b.iter()) {
        if at.kind() != bt.kind() {
            if at.is_pre_release() {
                return Ordering::Less;
            }
            if bt.is_pre_release() {
                return Ordering::Greater;
            }
            return bt.kind().cmp(&at.kind());
        }

        let ordering = match (at, bt) {
            (
                ApkToken::Digit { value: av, first },
                ApkToken::Digit { value: bv, .. },
            ) => {
                // Non-leading components with a leading zero compare as fractions
                if !first && (av.starts_with('0') || bv.starts_with('0')) {
                    av.trim_end_matches('0').cmp(bv.trim_end_matches('0'))
                } else {
                    compare_numeric(av.as_bytes(), bv.as_bytes())
                }
            }
            (ApkToken::Letter(a), ApkToken::Letter(b)) => a.cmp(b),
            (
                ApkToken::Suffix {
                    rank: ar,
                    number: an,
                },
                ApkToken::Suffix {
                    rank: br,
                    number: bn,
                },
            ) => ar.cmp(br).then(an.cmp(bn)),
            (ApkToken::Revision(a), ApkToken::Revision(b)) => a.cmp(b),
            _ => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ascending(grammar: VersionGrammar, versions: &[&str]) {
        for pair in versions.windows(2) {
            assert_eq!(
                grammar.compare(pair[0], pair[1]).unwrap(),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
            assert_eq!(grammar.compare(pair[1], pair[0]).unwrap(), Ordering::Greater);
        }
    }

    #[test]
    fn test_debian_ordering() {
        assert_ascending(
            VersionGrammar::Debian,
            &[
                "1.0~rc1-1",
                "1.0-1",
                "1.0-2",
                "1.0a-1",
                "1.0+b1-1",
                "1.1.1d-0+deb10u3",
                "1.1.1d-0+deb10u6",
                "2.0-1",
                "1:0.9-1",
            ],
        );
        assert_eq!(
            VersionGrammar::Debian.compare("1.02-1", "1.2-1").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_debian_malformed() {
        for bad in ["", "a1.0", "x:1.0", "1.0_1-1"] {
            assert!(
                matches!(
                    VersionGrammar::Debian.compare(bad, "1.0"),
                    Err(ParseError::MalformedVersion { .. })
                ),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_rpm_ordering() {
        assert_ascending(
            VersionGrammar::Rpm,
            &[
                "1.2-3.el8",
                "1.2-4.el8",
                "1.2.0-1",
                "1.10-1",
                "1.10a-1",
                "2.0~beta-1",
                "2.0-1",
                "2.0^git1-1",
                "1:0.1-1",
            ],
        );
        assert_eq!(
            VersionGrammar::Rpm.compare("0:1.2-3", "1.2-3").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_alpine_ordering() {
        assert_ascending(
            VersionGrammar::Alpine,
            &[
                "1.2.3_alpha",
                "1.2.3_rc2",
                "1.2.3",
                "1.2.3-r1",
                "1.2.3-r2",
                "1.2.3_p1",
                "1.2.3a",
                "1.2.3.1",
                "1.10",
            ],
        );
    }

    #[test]
    fn test_alpine_malformed() {
        for bad in ["", "v1.2", "1.2_foo", "1.2-1", "1.2.3~"] {
            assert!(
                VersionGrammar::Alpine.compare(bad, "1.0").is_err(),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_centos_normalization() {
        assert_eq!(normalize_centos("1.2-3.el8_4.centos"), "1.2-3.el8");
        assert_eq!(normalize_centos("1.2-3.el8"), "1.2-3.el8");
        assert_eq!(normalize_centos("2.17-317.sl7_9"), "2.17-317.el7");
        assert_eq!(
            VersionGrammar::RpmRhel
                .compare("1.2-3.el8_4.centos", "1.2-3.el8")
                .unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_unsupported_families() {
        for family in [Family::FreeBsd, Family::Windows, Family::Pseudo] {
            assert!(matches!(
                compare(family, "1", "2"),
                Err(DetectionError::UnsupportedFamily { .. })
            ));
        }
        assert_eq!(
            compare(Family::Ubuntu, "1.0-1", "1.0-2").unwrap(),
            Ordering::Less
        );
    }
}
