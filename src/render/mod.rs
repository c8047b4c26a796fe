use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::output::OutputFormat;
use crate::source::{Record, RecordId};

// one visible list unit: element id, title region, body region; deletion is keyed by `id`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedRecord {
    pub element_id: String,
    pub id: RecordId,
    pub title: String,
    pub body: String,
}

impl RenderedRecord {
    pub fn from_record(record: Record) -> Self {
        Self {
            element_id: element_id(&record.id),
            id: record.id,
            title: record.title,
            body: record.body,
        }
    }
}

pub fn element_id(id: &RecordId) -> String {
    format!("post-{id}")
}

// the list container; its contents are replaced wholesale on every render
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordList {
    units: Vec<RenderedRecord>,
}

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the list and inserts one unit per record, in input order.
    pub fn render(&mut self, records: Vec<Record>) {
        self.units = records.into_iter().map(RenderedRecord::from_record).collect();
    }

    /// Removes the unit for `id`, leaving every other unit in place.
    pub fn remove(&mut self, id: &RecordId) -> Option<RenderedRecord> {
        let idx = self.units.iter().position(|u| u.id == *id)?;
        Some(self.units.remove(idx))
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.units.iter().any(|u| u.id == *id)
    }

    pub fn units(&self) -> &[RenderedRecord] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn print<W: Write>(&self, format: OutputFormat, out: &mut W) -> std::io::Result<()> {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &self.units)?;
                writeln!(out)
            }
            OutputFormat::Text => {
                if self.units.is_empty() {
                    return writeln!(out, "{}", "(no records)".dimmed());
                }
                for unit in self.units.iter() {
                    writeln!(
                        out,
                        "{} {}",
                        format!("[{}]", unit.element_id).cyan(),
                        unit.title.bold()
                    )?;
                    for line in unit.body.lines() {
                        writeln!(out, "    {line}")?;
                    }
                    writeln!(out, "    {}", format!("delete: d {}", unit.id).dimmed())?;
                    writeln!(out)?;
                }
                Ok(())
            }
        }
    }
}
