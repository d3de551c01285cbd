// src/evaluate/prompt.rs
//! Prompt templates: loading, placeholder checks and rendering.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::info;

use crate::deal::Deal;

pub const REQUIRED_PLACEHOLDERS: [&str; 3] = ["title", "description", "category"];
pub const OPTIONAL_PLACEHOLDERS: [&str; 7] = [
    "price",
    "original_price",
    "discount_percentage",
    "url",
    "votes",
    "comments",
    "urgency_indicators",
];

const NOT_SPECIFIED: &str = "Not specified";

pub const DEFAULT_TEMPLATE: &str = "\
You are an expert deal evaluator. Decide whether the deal below matches the user's interests.

Deal:
- Title: {title}
- Description: {description}
- Category: {category}
- Price: {price}
- Original price: {original_price}
- Discount: {discount_percentage}
- Community votes: {votes}
- Comments: {comments}
- Urgency: {urgency_indicators}
- URL: {url}

Consider the discount, the price point and community engagement.
Answer \"RELEVANT\" or \"NOT RELEVANT\", then one or two sentences of reasoning.

Your evaluation:";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex"));

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to access prompt template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("prompt template is empty: {0}")]
    Empty(PathBuf),
    #[error("template missing required placeholders: {0:?}")]
    MissingPlaceholders(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Checks required placeholders; missing optional ones are only logged.
    pub fn parse(text: &str) -> Result<Self, PromptError> {
        let text = text.trim();
        let missing: Vec<String> = REQUIRED_PLACEHOLDERS
            .iter()
            .filter(|p| !text.contains(&format!("{{{p}}}")))
            .map(|p| format!("{{{p}}}"))
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingPlaceholders(missing));
        }

        let missing_optional: Vec<&str> = OPTIONAL_PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !text.contains(&format!("{{{p}}}")))
            .collect();
        if !missing_optional.is_empty() {
            info!(target: "evaluator", missing = ?missing_optional, "template omits optional placeholders");
        }

        Ok(Self {
            text: text.to_string(),
        })
    }

    pub fn default_template() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PromptError> {
        if !path.exists() {
            return Err(PromptError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Err(PromptError::Empty(path.to_path_buf()));
        }
        Self::parse(&text)
    }

    /// Load `path`, writing the default template there first if the file does
    /// not exist. An existing but invalid file is still an error.
    pub fn load_or_create_default(path: &Path) -> Result<Self, PromptError> {
        if path.exists() {
            return Self::load(path);
        }
        let io_err = |source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, DEFAULT_TEMPLATE).map_err(io_err)?;
        info!(target: "evaluator", path = %path.display(), "created default prompt template");
        Ok(Self::default_template())
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Single pass over the template; values are never re-scanned, and
    /// unknown `{names}` are left as they are.
    pub fn render(&self, deal: &Deal) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.text, |caps: &Captures| {
                placeholder_value(&caps[1], deal).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn placeholder_value(name: &str, deal: &Deal) -> Option<String> {
    let money = |v: Option<f64>| v.map_or_else(|| NOT_SPECIFIED.to_string(), |p| format!("{p:.2}"));
    let value = match name {
        "title" => deal.title.clone(),
        "description" => deal.description.clone(),
        "category" => deal.category.clone(),
        "url" => deal.url.clone(),
        "price" => money(deal.price),
        "original_price" => money(deal.original_price),
        "discount_percentage" => deal
            .discount_percentage
            .map_or_else(|| NOT_SPECIFIED.to_string(), |d| format!("{d:.1}%")),
        "votes" => deal
            .votes
            .map_or_else(|| NOT_SPECIFIED.to_string(), |v| v.to_string()),
        "comments" => deal
            .comments
            .map_or_else(|| NOT_SPECIFIED.to_string(), |c| c.to_string()),
        "urgency_indicators" => {
            if deal.urgency_indicators.is_empty() {
                "None".to_string()
            } else {
                deal.urgency_indicators.join(", ")
            }
        }
        _ => return None,
    };
    Some(value)
}

/// Templates under one directory, cached by relative path.
#[derive(Debug)]
pub struct PromptStore {
    dir: PathBuf,
    cache: HashMap<String, PromptTemplate>,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }

    pub fn load(&mut self, name: &str) -> Result<PromptTemplate, PromptError> {
        if let Some(t) = self.cache.get(name) {
            return Ok(t.clone());
        }
        let template = PromptTemplate::load_or_create_default(&self.resolve(name))?;
        info!(target: "evaluator", template = %name, "loaded prompt template");
        self.cache.insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Drop the cached copy and read the file again.
    pub fn reload(&mut self, name: &str) -> Result<PromptTemplate, PromptError> {
        self.cache.remove(name);
        self.load(name)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// `*.txt` files directly under the directory, sorted.
    pub fn available_templates(&self) -> Vec<String> {
        let Ok(rd) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut out: Vec<String> = rd
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "txt"))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        out.sort();
        out
    }
}
