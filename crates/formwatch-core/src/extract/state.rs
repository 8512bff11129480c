//! Best-effort reads of provider in-page state objects.
//!
//! Every reader returns an empty map on any shape it does not recognise.

use super::label::clean_label;
use crate::dom::Dom;
use formwatch_common::FieldMap;
use serde_json::Value;
use std::collections::HashMap;

const MAX_DEPTH: usize = 12;
const MAX_VISITED: usize = 5_000;

const LABEL_KEYS: [&str; 5] = ["title", "label", "questionText", "question", "name"];
const ANSWER_KEYS: [&str; 5] = ["answer", "value", "response", "answerText", "selectedValue"];

/// Google Forms publishes its question list as `FB_PUBLIC_LOAD_DATA_`:
/// `data[1][1]` is a list of `[id, title, description, type, [[entry_id, ..], ..]]`.
pub fn google_entry_titles(data: &Value) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    let Some(questions) = data.get(1).and_then(|d| d.get(1)).and_then(Value::as_array) else {
        return titles;
    };

    for question in questions {
        let Some(title) = question.get(1).and_then(Value::as_str).map(clean_label) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let entries = question.get(4).and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            if let Some(id) = entry.get(0).and_then(json_id) {
                titles.insert(id, title.clone());
            }
        }
    }
    titles
}

/// Pair Google's hidden `entry.<id>` inputs with question titles from the
/// load data. Entries without a known title keep their bare id.
pub fn google_state(dom: &dyn Dom) -> FieldMap {
    let mut fields = FieldMap::new();
    let titles = dom
        .read_global("FB_PUBLIC_LOAD_DATA_")
        .map(|data| google_entry_titles(&data))
        .unwrap_or_default();

    let Ok(inputs) = dom.query_all(None, "input[name^=\"entry.\"]") else {
        return fields;
    };
    for input in inputs {
        let Some(name) = dom.attr_text(input, "name") else {
            continue;
        };
        let id = name.trim_start_matches("entry.");
        // `entry.123_sentinel` marks checkbox presence, not an answer.
        if id.ends_with("_sentinel") || id.is_empty() {
            continue;
        }
        let Some(value) = dom
            .control(input)
            .ok()
            .map(|c| c.value.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            continue;
        };
        let key = titles.get(id).cloned().unwrap_or_else(|| id.to_string());
        fields.push_value(key, value);
    }
    fields
}

/// Read the first page global in `names` that yields any labelled answers.
pub fn read_state_globals(dom: &dyn Dom, names: &[&str]) -> FieldMap {
    names
        .iter()
        .filter_map(|name| dom.read_global(name))
        .map(|state| collect_labelled_answers(&state))
        .find(|fields| !fields.is_empty())
        .unwrap_or_default()
}

/// Walk an arbitrary JSON state tree looking for objects that carry both a
/// label-like key and an answer-like key.
pub fn collect_labelled_answers(state: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut visited = 0usize;
    walk(state, 0, &mut visited, &mut fields);
    fields
}

fn walk(value: &Value, depth: usize, visited: &mut usize, fields: &mut FieldMap) {
    *visited += 1;
    if depth > MAX_DEPTH || *visited > MAX_VISITED {
        return;
    }
    match value {
        Value::Object(map) => {
            let label = LABEL_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(clean_label)
                .filter(|l| !l.is_empty());
            let answer = ANSWER_KEYS.iter().find_map(|k| map.get(*k));
            if let (Some(label), Some(answer)) = (label, answer) {
                if !label.to_lowercase().contains("password") {
                    store_answer(fields, &label, answer);
                }
            }
            for child in map.values() {
                if child.is_object() || child.is_array() {
                    walk(child, depth + 1, visited, fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, visited, fields);
            }
        }
        _ => {}
    }
}

fn store_answer(fields: &mut FieldMap, label: &str, answer: &Value) {
    match answer {
        Value::Array(items) => {
            for item in items.iter().filter_map(scalar_text) {
                fields.push_value(label, item);
            }
        }
        other => {
            if let Some(text) = scalar_text(other) {
                fields.insert(label, text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};
    use formwatch_common::FieldValue;
    use serde_json::json;

    #[test]
    fn google_titles_from_load_data() {
        let data = json!([null, [null, [
            [1, "1. Your name *", null, 0, [[111, null, 1]]],
            [2, "Colour", null, 4, [[222, [["Red"], ["Blue"]], 0]]],
            [3, null, null, 8, null]
        ]]]);
        let titles = google_entry_titles(&data);
        assert_eq!(titles.get("111").map(String::as_str), Some("Your name"));
        assert_eq!(titles.get("222").map(String::as_str), Some("Colour"));
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn google_state_pairs_hidden_entries() {
        let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/x/viewform", "F");
        dom.set_global(
            "FB_PUBLIC_LOAD_DATA_",
            json!([null, [null, [[1, "Name", null, 0, [[111]]]]]]),
        );
        for (name, value) in [
            ("entry.111", "Ada"),
            ("entry.222", "x"),
            ("entry.222_sentinel", ""),
        ] {
            dom.append(
                dom.root(),
                NodeSpec::new("input").attr("type", "hidden").attr("name", name).value(value),
            );
        }
        let fields = google_state(&dom);
        assert_eq!(fields.get("Name"), Some(&FieldValue::from("Ada")));
        assert_eq!(fields.get("222"), Some(&FieldValue::from("x")));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn walker_finds_nested_answers() {
        let state = json!({
            "formState": {
                "questions": [
                    {"title": "Team", "answer": "Blue"},
                    {"questionText": "Tags", "value": ["a", "b"]},
                    {"title": "Password", "answer": "nope"},
                    {"title": "Unanswered"}
                ]
            }
        });
        let fields = collect_labelled_answers(&state);
        assert_eq!(fields.get("Team"), Some(&FieldValue::from("Blue")));
        assert_eq!(fields.get("Tags"), Some(&FieldValue::from(vec!["a", "b"])));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn unrecognised_shapes_are_empty() {
        assert!(google_entry_titles(&json!({"a": 1})).is_empty());
        assert!(collect_labelled_answers(&json!("text")).is_empty());
        let dom = MemoryDom::new("https://forms.office.com/r/x", "");
        assert!(read_state_globals(&dom, &["__INITIAL_STATE__"]).is_empty());
    }
}
