//! Lossy context compression for oversized conversation history.
//!
//! Before generation, assistants flagged for compression get their history
//! shrunk to a bounded digest. The most recent user message is always kept
//! verbatim; everything earlier is compressed by one of three escalating
//! strategies selected by estimated token volume. Compression is best-effort:
//! any internal failure falls back to hard truncation, and `compress` never
//! returns an error.

use regex::Regex;
use tracing::{debug, warn};

use taliesin_types::{
    BlockPayload, BlockStatus, Message, MessageBlock, MessageStatus, Role, TopicId,
};

/// A message paired with its rendered text content.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub message: Message,
    pub text: String,
}

impl ContextEntry {
    pub fn new(message: Message, text: impl Into<String>) -> Self {
        Self {
            message,
            text: text.into(),
        }
    }
}

/// Result of a compression pass.
#[derive(Debug, Clone)]
pub struct Compressed {
    /// The context to hand to generation, oldest first.
    pub entries: Vec<ContextEntry>,
    /// Synthetic summary block, for the view feed only; never persisted.
    pub summary_block: Option<MessageBlock>,
}

impl Compressed {
    fn unchanged(entries: Vec<ContextEntry>) -> Self {
        Self {
            entries,
            summary_block: None,
        }
    }
}

/// A topical bucket for the keyword-extraction strategy.
#[derive(Debug, Clone)]
pub struct KeywordBucket {
    /// Digest section label.
    pub label: String,
    /// Case-insensitive substrings that route a line into this bucket.
    pub keywords: Vec<String>,
    /// How many lines of this bucket survive into the digest.
    pub keep: usize,
}

impl KeywordBucket {
    pub fn new(label: impl Into<String>, keywords: &[&str], keep: usize) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            keep,
        }
    }
}

/// Configuration for the compressor.
///
/// The keyword vocabulary and every size threshold are deliberately
/// configuration, not constants: they encode one organization's reporting
/// vocabulary and should be tuned per deployment.
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Estimated-token volume above which compression kicks in.
    pub compression_threshold: usize,
    /// Content length (chars) below which the trivial strategy applies.
    pub trivial_floor: usize,
    /// Estimated-token volume up to which keyword extraction applies;
    /// above it the aggressive strategy is used.
    pub keyword_ceiling: usize,
    /// Hard cap on the keyword-extraction digest, in chars.
    pub digest_cap: usize,
    /// Hard cap on the aggressive digest, in chars.
    pub aggressive_cap: usize,
    /// Topical buckets for keyword extraction, in digest order.
    pub buckets: Vec<KeywordBucket>,
    /// Bucket label that date/week-pattern lines are routed into.
    pub time_bucket: String,
    /// Exact-match keywords for the aggressive strategy.
    pub aggressive_keywords: Vec<String>,
    /// How many deduplicated lines the aggressive digest keeps.
    pub aggressive_keep: usize,
    /// Warning appended to keyword-extraction digests.
    pub digest_warning: String,
    /// Stronger warning appended to aggressive digests.
    pub aggressive_warning: String,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            compression_threshold: 6_000,
            trivial_floor: 1_000,
            keyword_ceiling: 10_000,
            digest_cap: 1_500,
            aggressive_cap: 1_000,
            buckets: vec![
                KeywordBucket::new("work", &["work", "plan", "progress", "deliverable"], 3),
                KeywordBucket::new("meetings", &["meeting", "standup", "assigned"], 3),
                KeywordBucket::new("team", &["team", "member", "owner"], 2),
                KeywordBucket::new("time", &["week", "date", "deadline"], 3),
                KeywordBucket::new("data", &["query", "data", "table", "tool"], 3),
                KeywordBucket::new("status", &["done", "in progress", "delayed", "status"], 3),
            ],
            time_bucket: "time".to_string(),
            aggressive_keywords: vec![
                "work plan".to_string(),
                "task".to_string(),
                "owner".to_string(),
                "deliverable".to_string(),
                "deadline".to_string(),
                "status".to_string(),
            ],
            aggressive_keep: 10,
            digest_warning: "\n\nImportant: the above is a digest of earlier conversation. \
                             Prioritize the current user query over historical detail and call \
                             the available tools for up-to-date data."
                .to_string(),
            aggressive_warning: "\n\nCritical: the above is a heavily compressed summary of an \
                                 oversized history. Ignore historical detail, focus on the \
                                 current query, and always call the available tools for live \
                                 data."
                .to_string(),
        }
    }
}

/// Estimate token volume of a text: content length plus whitespace-delimited
/// word count. A cheap proxy, not a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() + text.split_whitespace().count()
}

enum Strategy {
    Trivial,
    Keyword,
    Aggressive,
}

#[derive(Debug)]
enum CompressError {
    EmptyDigest,
}

/// Lossy history compressor.
pub struct ContextCompressor {
    config: CompressorConfig,
    date_pattern: Regex,
    week_pattern: Regex,
}

impl ContextCompressor {
    pub fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            date_pattern: Regex::new(r"\d{4}-\d{2}-\d{2}").expect("static pattern"),
            week_pattern: Regex::new(r"(?i)\bweek\s*\d+|\bw\d{1,2}\b").expect("static pattern"),
        }
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Compress a context slice.
    ///
    /// Never fails: when a strategy cannot produce a digest the result is a
    /// hard truncation to the last two entries.
    pub fn compress(&self, entries: Vec<ContextEntry>) -> Compressed {
        let total_tokens: usize = entries.iter().map(|e| estimate_tokens(&e.text)).sum();

        if total_tokens <= self.config.compression_threshold {
            debug!(total_tokens, "context within bounds, no compression");
            return Compressed::unchanged(entries);
        }

        // The current query must survive compression verbatim.
        let Some(last_user) = entries
            .iter()
            .filter(|e| e.message.role == Role::User)
            .next_back()
            .cloned()
        else {
            warn!("no user message in context, skipping compression");
            return Compressed::unchanged(entries);
        };

        let historical: Vec<&ContextEntry> = entries
            .iter()
            .filter(|e| e.message.id != last_user.message.id)
            .collect();
        if historical.is_empty() {
            return Compressed::unchanged(entries);
        }

        let mut transcript = String::new();
        for entry in &historical {
            let speaker = match entry.message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            transcript.push_str(speaker);
            transcript.push_str(": ");
            transcript.push_str(&entry.text);
            transcript.push_str("\n\n");
        }

        let strategy = if transcript.chars().count() <= self.config.trivial_floor {
            Strategy::Trivial
        } else if total_tokens <= self.config.keyword_ceiling {
            Strategy::Keyword
        } else {
            Strategy::Aggressive
        };

        let summary = match strategy {
            Strategy::Trivial => Ok(format!("Conversation history digest: {transcript}")),
            Strategy::Keyword => self.extract_key_information(&transcript),
            Strategy::Aggressive => self.aggressive_extraction(&transcript),
        };

        match summary {
            Ok(summary) => {
                debug!(
                    total_tokens,
                    summary_chars = summary.chars().count(),
                    "context compressed"
                );
                let topic_id = last_user.message.topic_id;
                let (message, block) = self.summary_message(topic_id, summary.clone());
                let entries = vec![ContextEntry::new(message, summary), last_user];
                Compressed {
                    entries,
                    summary_block: Some(block),
                }
            }
            Err(e) => {
                // Best-effort contract: truncate rather than fail the pipeline.
                warn!(error = ?e, "compression failed, truncating to last two messages");
                let keep = entries.len().saturating_sub(2);
                Compressed::unchanged(entries.into_iter().skip(keep).collect())
            }
        }
    }

    /// Keyword-extraction strategy: bucket lines by topic, keep the first few
    /// per bucket plus date/week lines, cap the digest length.
    fn extract_key_information(&self, content: &str) -> Result<String, CompressError> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut categorized: Vec<Vec<&str>> = vec![Vec::new(); self.config.buckets.len()];
        let time_index = self
            .config
            .buckets
            .iter()
            .position(|b| b.label == self.config.time_bucket);

        for line in &lines {
            let lower = line.to_lowercase();
            let mut bucketed = false;
            for (i, bucket) in self.config.buckets.iter().enumerate() {
                if bucket.keywords.iter().any(|k| lower.contains(k)) {
                    categorized[i].push(line);
                    bucketed = true;
                    break;
                }
            }
            if !bucketed
                && let Some(i) = time_index
                && (self.date_pattern.is_match(line) || self.week_pattern.is_match(line))
            {
                categorized[i].push(line);
            }
        }

        if categorized.iter().all(|c| c.is_empty()) {
            return Err(CompressError::EmptyDigest);
        }

        let mut digest = String::from("Key points from earlier conversation:\n\n");
        for (bucket, lines) in self.config.buckets.iter().zip(&categorized) {
            if lines.is_empty() {
                continue;
            }
            digest.push_str(&format!("[{}]\n", bucket.label));
            for line in lines.iter().take(bucket.keep) {
                digest.push_str(line);
                digest.push('\n');
            }
            digest.push('\n');
        }

        let mut digest = cap_chars(&digest, self.config.digest_cap, "...(truncated)");
        digest.push_str(&self.config.digest_warning);
        Ok(digest)
    }

    /// Aggressive strategy: strict keyword/date filter, dedupe, small cap.
    fn aggressive_extraction(&self, content: &str) -> Result<String, CompressError> {
        let mut seen = std::collections::HashSet::new();
        let mut kept: Vec<&str> = Vec::new();

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let relevant = self
                .config
                .aggressive_keywords
                .iter()
                .any(|k| line.contains(k.as_str()))
                || self.date_pattern.is_match(line)
                || self.week_pattern.is_match(line);
            if relevant && seen.insert(line) {
                kept.push(line);
            }
        }

        if kept.is_empty() {
            return Err(CompressError::EmptyDigest);
        }

        let mut digest =
            String::from("Core facts from earlier conversation (aggressively compressed):\n\n");
        digest.push_str(
            &kept
                .iter()
                .take(self.config.aggressive_keep)
                .copied()
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let mut digest = cap_chars(&digest, self.config.aggressive_cap, "...");
        digest.push_str(&self.config.aggressive_warning);
        Ok(digest)
    }

    /// Build the synthetic user message carrying the digest. The block is
    /// published to the view so the digest is inspectable, but never
    /// persisted.
    fn summary_message(&self, topic_id: TopicId, summary: String) -> (Message, MessageBlock) {
        let mut message = Message::user(topic_id);
        message.status = MessageStatus::Success;
        let block = MessageBlock::new(
            message.id,
            BlockPayload::MainText { content: summary },
            BlockStatus::Success,
        );
        message.push_block(block.id);
        (message, block)
    }
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(CompressorConfig::default())
    }
}

fn cap_chars(text: &str, cap: usize, marker: &str) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(cap).collect();
    capped.push_str(marker);
    capped
}
