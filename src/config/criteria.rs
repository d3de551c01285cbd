// src/config/criteria.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// What the user wants to hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCriteria {
    pub prompt_template_path: String,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub min_discount_percentage: Option<f64>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub min_authenticity_score: f64,
}

impl Default for UserCriteria {
    fn default() -> Self {
        Self {
            prompt_template_path: "prompts/deal_evaluator.txt".into(),
            max_price: None,
            min_discount_percentage: None,
            categories: Vec::new(),
            keywords: Vec::new(),
            min_authenticity_score: 0.0,
        }
    }
}

impl UserCriteria {
    pub fn validate(&self) -> Result<()> {
        if self.prompt_template_path.trim().is_empty() {
            bail!("criteria.prompt_template_path cannot be empty");
        }
        if let Some(p) = self.max_price {
            if p <= 0.0 {
                bail!("criteria.max_price must be positive, got {p}");
            }
        }
        if let Some(d) = self.min_discount_percentage {
            if !(0.0..=100.0).contains(&d) {
                bail!("criteria.min_discount_percentage must be between 0 and 100, got {d}");
            }
        }
        if !(0.0..=1.0).contains(&self.min_authenticity_score) {
            bail!(
                "criteria.min_authenticity_score must be between 0 and 1, got {}",
                self.min_authenticity_score
            );
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            bail!("criteria.categories cannot contain empty entries");
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            bail!("criteria.keywords cannot contain empty entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_appear_in_errors() {
        let c = UserCriteria {
            max_price: Some(0.0),
            ..UserCriteria::default()
        };
        let msg = c.validate().unwrap_err().to_string();
        assert!(msg.contains("max_price"), "{msg}");

        let c = UserCriteria {
            min_discount_percentage: Some(120.0),
            ..UserCriteria::default()
        };
        assert!(c.validate().unwrap_err().to_string().contains("min_discount_percentage"));

        let c = UserCriteria {
            keywords: vec!["ssd".into(), "  ".into()],
            ..UserCriteria::default()
        };
        assert!(c.validate().unwrap_err().to_string().contains("keywords"));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(UserCriteria::default().validate().is_ok());
    }
}
