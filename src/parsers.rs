//! Parser adapters turning raw source pages into candidate endpoints.
//!
//! Every adapter is infallible: malformed input yields an empty list.

use crate::proxy::{is_valid_format, Endpoint};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Layout of a source's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// One `host:port` per line, `#` comments allowed.
    PlainText,
    /// free-proxy-list.net striped table.
    FreeProxyListHtml,
    /// spys.one listing; table cells plus a raw IP:port sweep.
    SpysHtml,
    /// Whitespace-separated `host:port` tokens (advanced.name export).
    WhitespaceList,
    /// freeproxy.world table, served across numbered pages.
    FreeProxyWorldHtml,
}

impl SourceFormat {
    pub fn parse(&self, content: &str) -> Vec<Endpoint> {
        match self {
            SourceFormat::PlainText => parse_plain_text(content),
            SourceFormat::FreeProxyListHtml => parse_free_proxy_list(content),
            SourceFormat::SpysHtml => parse_spys(content),
            SourceFormat::WhitespaceList => parse_whitespace_list(content),
            SourceFormat::FreeProxyWorldHtml => parse_freeproxy_world(content),
        }
    }

    /// Whether the listing continues on further `page=N` URLs.
    pub fn is_paginated(&self) -> bool {
        matches!(self, SourceFormat::FreeProxyWorldHtml)
    }
}

pub fn parse_plain_text(content: &str) -> Vec<Endpoint> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && line.contains(':'))
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(Endpoint::parse)
        .collect()
}

pub fn parse_whitespace_list(content: &str) -> Vec<Endpoint> {
    content.split_whitespace().filter_map(Endpoint::parse).collect()
}

pub fn parse_free_proxy_list(html: &str) -> Vec<Endpoint> {
    let doc = Html::parse_document(html);
    let (Some(rows), Some(cells)) = (
        selector("table.table.table-striped.table-bordered tr"),
        selector("td"),
    ) else {
        return Vec::new();
    };

    doc.select(&rows)
        .filter_map(|row| ip_port_from_cells(row.select(&cells).collect()))
        .collect()
}

pub fn parse_freeproxy_world(html: &str) -> Vec<Endpoint> {
    let doc = Html::parse_document(html);
    let (Some(table), Some(rows), Some(cells)) =
        (selector("table"), selector("tr"), selector("td, th"))
    else {
        return Vec::new();
    };
    let Some(table) = doc.select(&table).next() else {
        return Vec::new();
    };

    table
        .select(&rows)
        .skip(1)
        .filter_map(|row| ip_port_from_cells(row.select(&cells).collect()))
        .collect()
}

pub fn parse_spys(html: &str) -> Vec<Endpoint> {
    let doc = Html::parse_document(html);
    let mut found: Vec<Endpoint> = Vec::new();

    if let (Some(rows), Some(cells)) = (selector("tr"), selector("td")) {
        for row in doc.select(&rows) {
            let row_cells: Vec<ElementRef> = row.select(&cells).collect();
            if row_cells.len() < 2 {
                continue;
            }
            for cell in row_cells.iter().take(3) {
                let text = cell_text(cell);
                if !(text.contains('.') && text.contains(':')) {
                    continue;
                }
                let hit = text.split_whitespace().find(|part| {
                    part.contains(':')
                        && part.contains('.')
                        && !part.starts_with("http")
                        && is_valid_format(part)
                });
                if let Some(part) = hit {
                    found.push(Endpoint::from(part));
                }
            }
        }
    }

    if let Ok(pattern) = Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}:\d{1,5}\b") {
        for hit in pattern.find_iter(html) {
            if let Some(endpoint) = Endpoint::parse(hit.as_str()) {
                if !found.contains(&endpoint) {
                    found.push(endpoint);
                }
            }
        }
    }

    found
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn ip_port_from_cells(cells: Vec<ElementRef>) -> Option<Endpoint> {
    if cells.len() < 2 {
        return None;
    }
    let ip = cell_text(&cells[0]);
    let port = cell_text(&cells[1]);
    if ip.is_empty() || port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Endpoint::parse(&format!("{ip}:{port}"))
}
