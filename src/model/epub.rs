//! Output-document types: chapters and bibliographic metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chapter of the packaged output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChapter {
    /// Stable chapter id (e.g., "chapter_001")
    pub id: String,

    /// Chapter title
    pub title: String,

    /// Body text; blank lines separate paragraphs
    pub content: String,

    /// File name inside the package (e.g., "chapter_001.xhtml")
    pub file_name: String,

    /// Nesting level for navigation (0 = top level)
    pub level: u8,

    /// Source page the chapter starts on (1-indexed)
    pub source_page: u32,

    /// Ids of processed images embedded in this chapter
    pub image_ids: Vec<String>,
}

impl OutputChapter {
    pub fn new(index: usize, title: impl Into<String>, content: impl Into<String>) -> Self {
        let id = format!("chapter_{:03}", index + 1);
        let file_name = format!("{}.xhtml", id);
        Self {
            id,
            title: title.into(),
            content: content.into(),
            file_name,
            level: 0,
            source_page: 1,
            image_ids: Vec::new(),
        }
    }

    pub fn with_source_page(mut self, page: u32) -> Self {
        self.source_page = page;
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }
}

/// Bibliographic metadata for the packaged output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMetadata {
    /// Book title
    pub title: String,

    /// Author, "Unknown" when the source had none
    pub author: String,

    /// BCP 47 language tag ("en", "zh")
    pub language: String,

    /// Unique identifier (urn:uuid form)
    pub identifier: String,

    /// Publisher name
    pub publisher: String,

    /// Description text
    pub description: String,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Last-modified timestamp
    pub modified: DateTime<Utc>,

    /// Subject tags
    pub tags: Vec<String>,

    /// Provenance: conversion method, original page count, and the like
    pub provenance: BTreeMap<String, String>,
}

impl OutputMetadata {
    /// Build metadata with a fresh identifier and current timestamps.
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            author: author.into(),
            language: "en".to_string(),
            identifier: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            publisher: "bookforge".to_string(),
            description: String::new(),
            created: now,
            modified: now,
            tags: Vec::new(),
            provenance: BTreeMap::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Record a provenance entry (conversion method, source page count).
    pub fn record_provenance(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.provenance.insert(key.into(), value.into());
    }
}
