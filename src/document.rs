//! In-memory model of the host document: style sheets, their rules and the
//! cloned subtree root that receives the embedded font CSS.

use crate::css_rules::extract_rules;
use crate::EmbedError;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;

static IMPORT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^@import\s*(?:url\(\s*['"]?([^'")]+?)['"]?\s*\)|"([^"]*)"|'([^']*)')"#)
        .expect("valid regex")
});

static SRC_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[{;\s])src\s*:\s*((?:url\([^)]*\)|[^;}])+)").expect("valid regex"));

pub type DocumentHandle = Arc<RwLock<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssRuleKind {
    Import,
    FontFace,
    Media,
    Keyframes,
    Style,
    Other,
}

impl CssRuleKind {
    fn classify(css_text: &str) -> Self {
        if !css_text.starts_with('@') {
            return CssRuleKind::Style;
        }

        let name: String = css_text[1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match name.as_str() {
            "import" => CssRuleKind::Import,
            "font-face" => CssRuleKind::FontFace,
            "media" => CssRuleKind::Media,
            name if name.ends_with("keyframes") => CssRuleKind::Keyframes,
            _ => CssRuleKind::Other,
        }
    }
}

/// One rule of a style sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub css_text: String,
    pub kind: CssRuleKind,
    /// URL of the sheet the rule belongs to, `None` for inline sheets
    pub parent_href: Option<String>,
}

impl CssRule {
    /// Validate rule text the way a style engine's `insertRule` would,
    /// rejecting empty, unterminated or brace-unbalanced text.
    pub fn parse(css_text: &str, parent_href: Option<&str>) -> Result<Self, EmbedError> {
        let css_text = css_text.trim();
        if css_text.is_empty() {
            return Err(EmbedError::InvalidRule("empty rule".to_string()));
        }

        let mut depth = 0i32;
        for c in css_text.chars() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(EmbedError::InvalidRule(format!("unbalanced braces in {css_text}")));
        }

        let kind = CssRuleKind::classify(css_text);
        let terminated = match kind {
            CssRuleKind::Import => css_text.ends_with(';') && !css_text.contains('{'),
            CssRuleKind::Other if !css_text.contains('{') => css_text.ends_with(';'),
            _ => css_text.contains('{') && css_text.ends_with('}'),
        };
        if !terminated {
            return Err(EmbedError::InvalidRule(format!("unterminated rule {css_text}")));
        }

        Ok(Self {
            css_text: css_text.to_string(),
            kind,
            parent_href: parent_href.map(str::to_string),
        })
    }

    /// Target of an `@import` rule as written.
    pub fn import_href(&self) -> Option<&str> {
        if self.kind != CssRuleKind::Import {
            return None;
        }
        let captures = IMPORT_TARGET.captures(&self.css_text)?;
        (1..=3)
            .find_map(|group| captures.get(group))
            .map(|m| m.as_str().trim())
            .filter(|href| !href.is_empty())
    }

    /// Value of the `src` declaration of a font-face rule.
    pub fn font_src(&self) -> Option<&str> {
        if self.kind != CssRuleKind::FontFace {
            return None;
        }
        SRC_DECLARATION
            .captures(&self.css_text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().trim())
    }
}

#[derive(Debug, Clone)]
pub struct StyleSheet {
    href: Option<String>,
    /// `None` when the rule list is not readable (cross-origin sheet)
    rules: Option<Vec<CssRule>>,
}

impl StyleSheet {
    /// A `<style>` element's sheet.
    pub fn inline(css_text: &str) -> Self {
        Self::from_rules(None, css_text)
    }

    /// A same-origin `<link>` sheet whose rules are readable.
    pub fn linked(href: impl Into<String>, css_text: &str) -> Self {
        Self::from_rules(Some(href.into()), css_text)
    }

    /// A sheet whose rules cannot be read by the document.
    pub fn cross_origin(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            rules: None,
        }
    }

    fn from_rules(href: Option<String>, css_text: &str) -> Self {
        let rules = extract_rules(css_text)
            .iter()
            .filter_map(|text| CssRule::parse(text, href.as_deref()).ok())
            .collect();
        Self {
            href,
            rules: Some(rules),
        }
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn is_readable(&self) -> bool {
        self.rules.is_some()
    }

    pub fn css_rules(&self) -> Result<&[CssRule], EmbedError> {
        self.rules.as_deref().ok_or_else(|| {
            EmbedError::CrossOrigin(self.href.clone().unwrap_or_default())
        })
    }

    pub fn len(&self) -> usize {
        self.rules.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `css_text` before position `index` (clamped to the rule count)
    /// and return the position it landed at.
    pub fn insert_rule(&mut self, css_text: &str, index: usize) -> Result<usize, EmbedError> {
        let rule = CssRule::parse(css_text, self.href.as_deref())?;
        let href = self.href.clone().unwrap_or_default();
        let rules = self
            .rules
            .as_mut()
            .ok_or(EmbedError::CrossOrigin(href))?;

        let index = index.min(rules.len());
        rules.insert(index, rule);
        Ok(index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub url: String,
    pub style_sheets: Vec<StyleSheet>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            style_sheets: Vec::new(),
        }
    }

    pub fn with_style_sheet(mut self, sheet: StyleSheet) -> Self {
        self.style_sheets.push(sheet);
        self
    }

    pub fn into_handle(self) -> DocumentHandle {
        Arc::new(RwLock::new(self))
    }
}

/// Root of a cloned subtree.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag_name: String,
    pub text_content: Option<String>,
    pub children: Vec<Element>,
    owner_document: Option<DocumentHandle>,
}

impl Element {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Default::default()
        }
    }

    pub fn attached_to(mut self, document: DocumentHandle) -> Self {
        self.owner_document = Some(document);
        self
    }

    pub fn owner_document(&self) -> Option<&DocumentHandle> {
        self.owner_document.as_ref()
    }

    pub fn prepend_child(&mut self, child: Element) {
        self.children.insert(0, child);
    }
}
