// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use super::{Filter, FormulaValue, Icon, Page, Properties, PropertyValue, Sort, Store, StoreError};

const API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

const UA: &str = concat!(
    "expenser/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/expenser/expenser)"
);

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

/// Blocking Notion REST client. Pagination is followed inside `query`;
/// callers always see the full result set.
pub struct NotionClient {
    client: reqwest::blocking::Client,
    token: String,
}

impl NotionClient {
    pub fn new(token: String) -> Result<Self> {
        Ok(NotionClient {
            client: http_client()?,
            token,
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<Value, StoreError> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(StoreError::Transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(StoreError::Request(format!("HTTP {}: {}", status, body)));
        }
        resp.json::<Value>()
            .map_err(|e| StoreError::Transient(e.to_string()))
    }
}

impl Store for NotionClient {
    fn query(
        &self,
        database_id: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Page>, StoreError> {
        let url = format!("{}/databases/{}/query", API_BASE, database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": 100 });
            if let Some(f) = filter_to_json(filter) {
                body["filter"] = f;
            }
            if let Some(s) = sort {
                body["sorts"] = json!([{
                    "property": s.property,
                    "direction": if s.descending { "descending" } else { "ascending" },
                }]);
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let value = self.send(self.client.post(&url).json(&body))?;
            for result in value["results"].as_array().into_iter().flatten() {
                pages.push(parse_page(result)?);
            }
            if value["has_more"].as_bool().unwrap_or(false) {
                cursor = value["next_cursor"].as_str().map(|s| s.to_string());
                if cursor.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(pages)
    }

    fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
        icon: Option<Icon>,
    ) -> Result<Page, StoreError> {
        let url = format!("{}/pages", API_BASE);
        let mut body = json!({
            "parent": { "database_id": database_id },
            "properties": properties_to_json(&properties),
        });
        if let Some(icon) = icon {
            body["icon"] = icon_to_json(&icon);
        }
        let value = self.send(self.client.post(&url).json(&body))?;
        parse_page(&value)
    }

    fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), StoreError> {
        let url = format!("{}/pages/{}", API_BASE, page_id);
        let body = json!({ "properties": properties_to_json(&properties) });
        self.send(self.client.patch(&url).json(&body))?;
        Ok(())
    }

    fn archive_page(&self, page_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/pages/{}", API_BASE, page_id);
        self.send(self.client.patch(&url).json(&json!({ "archived": true })))?;
        Ok(())
    }
}

fn filter_to_json(filter: &Filter) -> Option<Value> {
    match filter {
        Filter::All => None,
        Filter::TitleEquals { property, value } => Some(json!({
            "property": property, "title": { "equals": value },
        })),
        Filter::RichTextEquals { property, value } => Some(json!({
            "property": property, "rich_text": { "equals": value },
        })),
        Filter::DateOnOrAfter { property, date } => Some(json!({
            "property": property, "date": { "on_or_after": date.to_string() },
        })),
        Filter::DateBetween {
            property,
            start,
            end,
        } => Some(json!({
            "and": [
                { "property": property, "date": { "on_or_after": start.to_string() } },
                { "property": property, "date": { "on_or_before": end.to_string() } },
            ]
        })),
        Filter::And(parts) => {
            let parts: Vec<Value> = parts.iter().filter_map(filter_to_json).collect();
            if parts.is_empty() {
                None
            } else {
                Some(json!({ "and": parts }))
            }
        }
    }
}

fn icon_to_json(icon: &Icon) -> Value {
    match icon {
        Icon::Emoji(e) => json!({ "type": "emoji", "emoji": e }),
        Icon::External(url) => json!({ "type": "external", "external": { "url": url } }),
    }
}

fn decimal_to_json(d: Decimal) -> Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn properties_to_json(properties: &Properties) -> Value {
    let mut out = serde_json::Map::new();
    for (key, value) in properties {
        let v = match value {
            PropertyValue::Title(s) => {
                json!({ "title": [{ "text": { "content": s } }] })
            }
            PropertyValue::RichText(s) => {
                json!({ "rich_text": [{ "text": { "content": s } }] })
            }
            PropertyValue::Number(n) => {
                json!({ "number": n.map(decimal_to_json).unwrap_or(Value::Null) })
            }
            PropertyValue::Checkbox(b) => json!({ "checkbox": b }),
            PropertyValue::Url(u) => json!({ "url": u }),
            PropertyValue::Select(s) => match s {
                Some(name) => json!({ "select": { "name": name } }),
                None => json!({ "select": Value::Null }),
            },
            PropertyValue::MultiSelect(names) => {
                let opts: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
                json!({ "multi_select": opts })
            }
            PropertyValue::Date { start, end } => match start {
                Some(start) => json!({ "date": {
                    "start": start.to_string(),
                    "end": end.map(|d| d.to_string()),
                }}),
                None => json!({ "date": Value::Null }),
            },
            PropertyValue::Relation(ids) => {
                let refs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
                json!({ "relation": refs })
            }
            // Formulas are computed by the store; never written back.
            PropertyValue::Formula(_) => continue,
        };
        out.insert(key.clone(), v);
    }
    Value::Object(out)
}

fn plain_text(value: &Value) -> String {
    value
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    value.as_f64().and_then(|f| Decimal::try_from(f).ok())
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    // Notion date starts may carry a time component; the calendar day is all
    // the engine uses.
    value
        .as_str()
        .and_then(|s| s.get(..10))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_page(value: &Value) -> Result<Page, StoreError> {
    let id = value["id"]
        .as_str()
        .ok_or_else(|| StoreError::Request("page without id".to_string()))?
        .to_string();
    let last_edited = value["last_edited_time"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let icon = match value["icon"]["type"].as_str() {
        Some("emoji") => value["icon"]["emoji"]
            .as_str()
            .map(|e| Icon::Emoji(e.to_string())),
        Some("external") => value["icon"]["external"]["url"]
            .as_str()
            .map(|u| Icon::External(u.to_string())),
        _ => None,
    };

    let mut properties = Properties::new();
    if let Some(props) = value["properties"].as_object() {
        for (key, prop) in props {
            let parsed = match prop["type"].as_str() {
                Some("title") => Some(PropertyValue::Title(plain_text(&prop["title"]))),
                Some("rich_text") => Some(PropertyValue::RichText(plain_text(&prop["rich_text"]))),
                Some("number") => Some(PropertyValue::Number(parse_decimal(&prop["number"]))),
                Some("checkbox") => Some(PropertyValue::Checkbox(
                    prop["checkbox"].as_bool().unwrap_or(false),
                )),
                Some("url") => Some(PropertyValue::Url(
                    prop["url"].as_str().map(|s| s.to_string()),
                )),
                Some("select") => Some(PropertyValue::Select(
                    prop["select"]["name"].as_str().map(|s| s.to_string()),
                )),
                Some("multi_select") => {
                    let names = prop["multi_select"]
                        .as_array()
                        .map(|opts| {
                            opts.iter()
                                .filter_map(|o| o["name"].as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(PropertyValue::MultiSelect(names))
                }
                Some("date") => Some(PropertyValue::Date {
                    start: parse_date(&prop["date"]["start"]),
                    end: parse_date(&prop["date"]["end"]),
                }),
                Some("relation") => {
                    let ids = prop["relation"]
                        .as_array()
                        .map(|rels| {
                            rels.iter()
                                .filter_map(|r| r["id"].as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(PropertyValue::Relation(ids))
                }
                Some("formula") => {
                    let f = &prop["formula"];
                    let value = match f["type"].as_str() {
                        Some("number") => parse_decimal(&f["number"]).map(FormulaValue::Number),
                        Some("string") => {
                            f["string"].as_str().map(|s| FormulaValue::Text(s.to_string()))
                        }
                        _ => None,
                    };
                    Some(PropertyValue::Formula(value))
                }
                // Property kinds the engine does not consume are skipped.
                _ => None,
            };
            if let Some(parsed) = parsed {
                properties.insert(key.clone(), parsed);
            }
        }
    }

    Ok(Page {
        id,
        last_edited,
        icon,
        properties,
    })
}
