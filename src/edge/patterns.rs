//! Closed lists the edge predicate matches against.

use regex::{Regex, RegexBuilder};

use crate::error::InterceptError;
use crate::Result;

/// Path suffixes that are never prerendered.
pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] = &[
    "js", "css", "xml", "less", "png", "jpg", "jpeg", "gif", "pdf", "doc", "txt", "ico", "rss",
    "zip", "mp3", "rar", "exe", "wmv", "avi", "ppt", "mpg", "mpeg", "tif", "wav", "mov", "psd",
    "ai", "xls", "mp4", "m4a", "swf", "dat", "dmg", "iso", "flv", "m4v", "torrent", "ttf", "woff",
    "woff2", "svg", "eot", "webp", "avif",
];

/// Crawler and link-preview signatures, matched as case-insensitive
/// substrings of the `User-Agent`.
pub const DEFAULT_BOT_USER_AGENTS: &[&str] = &[
    "googlebot",
    "bingbot",
    "yandex",
    "baiduspider",
    "yahoo! slurp",
    "duckduckbot",
    "facebookexternalhit",
    "twitterbot",
    "rogerbot",
    "linkedinbot",
    "embedly",
    "quora link preview",
    "showyoubot",
    "outbrain",
    "pinterest/0.",
    "pinterestbot",
    "developers.google.com/+/web/snippet",
    "slackbot",
    "vkshare",
    "w3c_validator",
    "redditbot",
    "applebot",
    "whatsapp",
    "flipboard",
    "tumblr",
    "bitlybot",
    "skypeuripreview",
    "nuzzel",
    "discordbot",
    "google page speed",
    "qwantify",
    "bitrix link preview",
    "xing-contenttabreceiver",
    "chrome-lighthouse",
    "telegrambot",
    "google-inspectiontool",
];

#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    suffixes: Vec<String>,
}

impl ExtensionMatcher {
    /// Accepts extensions with or without the leading dot.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let suffixes = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e))
            .collect();
        Self { suffixes }
    }

    pub fn is_static_asset(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct BotMatcher {
    // `None` when the list is empty: nothing is a bot
    pattern: Option<Regex>,
}

impl BotMatcher {
    pub fn new<S: AsRef<str>>(signatures: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = signatures
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| InterceptError::Config(format!("bot signatures: {}", e)))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|p| p.is_match(user_agent))
            .unwrap_or(false)
    }
}
