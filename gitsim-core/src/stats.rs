//! Shape statistics for the block index: how full its nodes are.

use std::collections::HashMap;
use std::fmt;

/// Tracks how many nodes hold each key count.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub name: String,
    pub counts: HashMap<usize, usize>,
    pub total_count: usize,
    pub total_keys: usize,
}

impl Histogram {
    /// Create a new histogram with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Histogram {
            name: name.into(),
            counts: HashMap::new(),
            total_count: 0,
            total_keys: 0,
        }
    }

    /// Record a node holding `keys` keys.
    pub fn record(&mut self, keys: usize) {
        *self.counts.entry(keys).or_insert(0) += 1;
        self.total_count += 1;
        self.total_keys += keys;
    }

    /// Average keys per node.
    pub fn average(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.total_keys as f64 / self.total_count as f64
        }
    }

    /// Group the recorded key counts into at most `bucket_count` ranges.
    ///
    /// # Returns
    ///
    /// List of (range_label, node_count) tuples sorted by range start
    pub fn format_buckets(&self, bucket_count: usize) -> Vec<(String, usize)> {
        let (Some(&min_keys), Some(&max_keys)) = (self.counts.keys().min(), self.counts.keys().max()) else {
            return Vec::new();
        };

        let bucket_width = std::cmp::max(1, (max_keys - min_keys + 1) / bucket_count.max(1));
        let mut buckets: HashMap<usize, usize> = HashMap::new();
        for (&keys, &count) in &self.counts {
            let bucket_start = min_keys + (keys - min_keys) / bucket_width * bucket_width;
            *buckets.entry(bucket_start).or_insert(0) += count;
        }

        let mut sorted: Vec<_> = buckets.into_iter().collect();
        sorted.sort_by_key(|(start, _)| *start);
        sorted
            .into_iter()
            .map(|(start, count)| (format!("{}-{}", start, start + bucket_width - 1), count))
            .collect()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return writeln!(f, "  No {} recorded", self.name);
        }
        writeln!(
            f,
            "  {} fill distribution ({} nodes):",
            self.name,
            format_with_commas(self.total_count)
        )?;
        for (range_label, count) in self.format_buckets(8) {
            let pct = (count as f64 * 100.0) / self.total_count as f64;
            let bar = "#".repeat((pct / 2.0) as usize);
            writeln!(
                f,
                "    {:>9} keys: {:>6} ({:>5.1}%) {}",
                range_label,
                format_with_commas(count),
                pct,
                bar
            )?;
        }
        Ok(())
    }
}

/// Node fill statistics for a block index.
#[derive(Debug, Clone)]
pub struct BlockIndexStats {
    pub height: usize,
    pub leaf_histogram: Histogram,
    pub internal_histogram: Histogram,
}

impl BlockIndexStats {
    pub fn new() -> Self {
        BlockIndexStats {
            height: 0,
            leaf_histogram: Histogram::new("Leaf node"),
            internal_histogram: Histogram::new("Internal node"),
        }
    }

    pub fn record_leaf(&mut self, keys: usize) {
        self.leaf_histogram.record(keys);
    }

    pub fn record_internal(&mut self, keys: usize) {
        self.internal_histogram.record(keys);
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.leaf_histogram.total_count + self.internal_histogram.total_count
    }

    /// Total number of keys.
    pub fn key_count(&self) -> usize {
        self.leaf_histogram.total_keys + self.internal_histogram.total_keys
    }
}

impl Default for BlockIndexStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockIndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "height {}, {} nodes, {} keys",
            self.height,
            format_with_commas(self.node_count()),
            format_with_commas(self.key_count())
        )?;
        write!(f, "{}", self.leaf_histogram)?;
        write!(f, "{}", self.internal_histogram)
    }
}

/// Helper function to format numbers with commas
fn format_with_commas(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result.chars().rev().collect()
}
