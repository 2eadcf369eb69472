//! Images curated into the single-page site sections.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Page section consuming a portfolio image.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Portfolio,
    BeforeAfter,
    Hero,
    About,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Portfolio => "portfolio",
            Category::BeforeAfter => "before-after",
            Category::Hero => "hero",
            Category::About => "about",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portfolio" => Ok(Category::Portfolio),
            "before-after" => Ok(Category::BeforeAfter),
            "hero" => Ok(Category::Hero),
            "about" => Ok(Category::About),
            other => Err(format!("unknown category `{}`", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PortfolioImage {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub category: Category,
    pub order_index: i64,
}

/// Fields accepted when creating or editing a portfolio image.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PortfolioDraft {
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Category::BeforeAfter).unwrap(),
            "\"before-after\""
        );
        assert_eq!("hero".parse::<Category>(), Ok(Category::Hero));
        assert!("gallery".parse::<Category>().is_err());
    }
}
