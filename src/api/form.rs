//! Multipart mutation payloads.
//!
//! Text fields may repeat (`audience`, `links`, `kept`); any part carrying a
//! file name becomes an upload.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::classroom::comments::MessageDraft;
use crate::classroom::schedule::LocalTime;
use crate::classroom::stream::{Classwork, PostDraft, PostKind};
use crate::classroom::submissions::Work;
use crate::classroom::{Audience, Upload};
use crate::error::{ClassroomError, Result};

/// "No topic" as sent by forms
const NO_TOPIC: &str = "none";

#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, Vec<String>>,
    files: Vec<Upload>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Form::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ClassroomError::invalid(format!("malformed form: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ClassroomError::invalid(format!("unreadable file '{}': {}", file_name, e)))?;
                    if !data.is_empty() {
                        form.files.push(Upload::new(file_name, data));
                    }
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ClassroomError::invalid(format!("unreadable field '{}': {}", name, e)))?;
                    form.push(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Checkbox semantics: present and truthy
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name), Some("true" | "on" | "1" | "yes"))
    }

    pub fn int(&self, name: &str) -> Result<Option<i32>> {
        self.text(name)
            .map(|raw| {
                raw.parse::<i32>()
                    .map_err(|_| ClassroomError::invalid(format!("{} must be a whole number", name)))
            })
            .transpose()
    }

    fn ints(&self, name: &str) -> Result<Vec<i32>> {
        self.all(name)
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<i32>()
                    .map_err(|_| ClassroomError::invalid(format!("{} holds a non-numeric id", name)))
            })
            .collect()
    }

    fn local_time(&self, name: &str) -> Result<Option<LocalTime>> {
        let offset = self.int("utc_offset")?.unwrap_or(0);
        self.text(name).map(|raw| LocalTime::parse(raw, offset)).transpose()
    }

    /// Attachment URLs the caller keeps from the current record
    pub fn kept(&self) -> Vec<String> {
        self.all("kept")
    }

    pub fn post_draft(&mut self) -> Result<PostDraft> {
        let kind: PostKind = self.text("kind").unwrap_or("announcement").parse()?;

        let audience = if self.flag("announce_to_all") {
            Audience::All
        } else {
            Audience::Only(self.ints("audience")?)
        };

        let topic_id = match self.text("topic_id") {
            None | Some(NO_TOPIC) => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| ClassroomError::invalid("topic_id must be an id or 'none'"))?,
            ),
        };

        let classwork = if kind.is_gradeable() {
            Some(Classwork {
                due: self.local_time("due_at")?,
                total_points: self.int("total_points")?,
                accept_submissions: self.flag("accept_submissions"),
                close_after_due: self.flag("close_after_due"),
            })
        } else {
            None
        };

        Ok(PostDraft {
            kind,
            caption: self.text("caption").unwrap_or_default().to_string(),
            title: self.text("title").map(str::to_string),
            audience,
            links: self.all("links"),
            files: std::mem::take(&mut self.files),
            topic_id,
            scheduled: self.local_time("scheduled_at")?,
            classwork,
        })
    }

    pub fn work(&mut self) -> Work {
        Work::new(std::mem::take(&mut self.files), self.all("links"))
    }

    pub fn message(&mut self) -> MessageDraft {
        MessageDraft::text(self.text("body").unwrap_or_default())
            .with_files(std::mem::take(&mut self.files))
            .with_links(self.all("links"))
    }
}
