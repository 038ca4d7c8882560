//! Aggregated results.
//!
//! Checks report through their exit code: 0 is ok, 1 warning, 2 critical.
//! Anything else, including a job that never produced a code, is unknown.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::hostlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Bucket {
    /// Report order.
    pub const ALL: [Bucket; 4] = [Bucket::Ok, Bucket::Warning, Bucket::Critical, Bucket::Unknown];

    pub fn classify(code: Option<i32>) -> Self {
        match code {
            Some(0) => Bucket::Ok,
            Some(1) => Bucket::Warning,
            Some(2) => Bucket::Critical,
            _ => Bucket::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Ok => "ok",
            Bucket::Warning => "warning",
            Bucket::Critical => "critical",
            Bucket::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node names collected per bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    buckets: BTreeMap<Bucket, BTreeSet<String>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate<S: AsRef<str>>(&mut self, bucket: Bucket, nodes: &[S]) {
        self.buckets
            .entry(bucket)
            .or_default()
            .extend(nodes.iter().map(|n| n.as_ref().to_string()));
    }

    pub fn nodes(&self, bucket: Bucket) -> impl Iterator<Item = &str> {
        self.buckets
            .get(&bucket)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(BTreeSet::is_empty)
    }

    /// One `<bucket>: <node range>` line per non-empty bucket, in report order.
    pub fn render(&self) -> Vec<String> {
        Bucket::ALL
            .iter()
            .filter_map(|bucket| {
                let nodes = self.buckets.get(bucket).filter(|nodes| !nodes.is_empty())?;
                Some(format!("{}: {}", bucket, hostlist::compress(nodes)))
            })
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for line in self.render() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Bucket::classify(Some(0)), Bucket::Ok);
        assert_eq!(Bucket::classify(Some(1)), Bucket::Warning);
        assert_eq!(Bucket::classify(Some(2)), Bucket::Critical);
        for code in [3, 4, 127, 255, -1, -15, i32::MAX, i32::MIN] {
            assert_eq!(Bucket::classify(Some(code)), Bucket::Unknown);
        }
        assert_eq!(Bucket::classify(None), Bucket::Unknown);
    }

    #[test]
    fn test_render_in_bucket_order_skipping_empty() {
        let mut report = Report::new();
        report.accumulate(Bucket::Critical, &["n5", "n6"]);
        report.accumulate(Bucket::Ok, &["n2", "n1"]);
        report.accumulate(Bucket::Warning, &["n3", "n4"]);
        assert_eq!(
            report.render(),
            vec!["ok: n[1-2]", "warning: n[3-4]", "critical: n[5-6]"]
        );
        assert_eq!(
            report.to_string(),
            "ok: n[1-2]\nwarning: n[3-4]\ncritical: n[5-6]\n"
        );
    }

    #[test]
    fn test_render_single_unknown_node() {
        let mut report = Report::new();
        report.accumulate(Bucket::classify(Some(3)), &["n1"]);
        assert_eq!(report.render(), vec!["unknown: n1"]);
    }

    #[test]
    fn test_empty_report_renders_nothing() {
        let mut report = Report::new();
        assert!(report.render().is_empty());
        report.accumulate::<String>(Bucket::Ok, &[]);
        assert!(report.is_empty());
        assert!(report.render().is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn test_accumulate_merges_groups() {
        let mut report = Report::new();
        report.accumulate(Bucket::Ok, &["n1"]);
        report.accumulate(Bucket::Ok, &["n3"]);
        report.accumulate(Bucket::Ok, &["n2"]);
        assert_eq!(report.nodes(Bucket::Ok).collect::<Vec<_>>(), vec!["n1", "n2", "n3"]);
        assert_eq!(report.nodes(Bucket::Unknown).count(), 0);
    }
}
