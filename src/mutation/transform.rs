//! Speculative and merge transforms over cached collection shapes.
//!
//! Collections are cached in one of three shapes:
//!
//! - a bare array of items;
//! - a counted envelope `{"items": [...], "total_count": n}`;
//! - an accumulated infinite list `{"pages": [{"items": [...]}, ...], "next_cursor": ..}`.
//!
//! Every transform returns `None` when the value has none of these shapes, in
//! which case the caller leaves the entry untouched.

use serde_json::Value;

/// Item identity used by the `*_by_id` transforms.
pub fn item_id(item: &Value) -> Option<&Value> {
    item.get("id")
}

/// Rewrite the item list(s) inside `value`. Counted envelopes move their
/// `total_count` by the change in item count.
fn edit_items<F>(value: &Value, edit: &F) -> Option<Value>
where
    F: Fn(&[Value]) -> Vec<Value>,
{
    match value {
        Value::Array(items) => Some(Value::Array(edit(items))),
        Value::Object(map) if map.contains_key("pages") => {
            let pages = map.get("pages")?.as_array()?;
            let pages = pages
                .iter()
                .map(|page| edit_items(page, edit).unwrap_or_else(|| page.clone()))
                .collect();
            let mut next = map.clone();
            next.insert("pages".to_owned(), Value::Array(pages));
            Some(Value::Object(next))
        }
        Value::Object(map) => {
            let items = map.get("items")?.as_array()?;
            let edited = edit(items);
            let removed = items.len() as i64 - edited.len() as i64;
            let mut next = map.clone();
            if let Some(total) = map.get("total_count").and_then(Value::as_i64) {
                next.insert("total_count".to_owned(), Value::from((total - removed).max(0)));
            }
            next.insert("items".to_owned(), Value::Array(edited));
            Some(Value::Object(next))
        }
        _ => None,
    }
}

/// Drop every item matching `predicate`.
pub fn remove_where<P>(value: &Value, predicate: P) -> Option<Value>
where
    P: Fn(&Value) -> bool,
{
    edit_items(value, &|items: &[Value]| {
        items
            .iter()
            .filter(|item| !predicate(*item))
            .cloned()
            .collect()
    })
}

pub fn remove_by_id(value: &Value, id: &Value) -> Option<Value> {
    remove_where(value, |item| item_id(item) == Some(id))
}

/// Append `item` to a flat collection. Accumulated infinite lists are left
/// alone: a new item belongs to whichever page the server puts it on.
pub fn append(value: &Value, item: &Value) -> Option<Value> {
    if value.get("pages").is_some() {
        return None;
    }
    edit_items(value, &|items: &[Value]| {
        let mut next = items.to_vec();
        next.push(item.clone());
        next
    })
}

/// Replace the item sharing `item`'s id with `item` itself.
pub fn replace_by_id(value: &Value, item: &Value) -> Option<Value> {
    let id = item_id(item)?;
    edit_items(value, &|items: &[Value]| {
        items
            .iter()
            .map(|existing| {
                if item_id(existing) == Some(id) {
                    item.clone()
                } else {
                    existing.clone()
                }
            })
            .collect()
    })
}

/// Shallow-merge the fields of `patch` into the item with `id`.
pub fn patch_by_id(value: &Value, id: &Value, patch: &Value) -> Option<Value> {
    let fields = patch.as_object()?;
    edit_items(value, &|items: &[Value]| {
        items
            .iter()
            .map(|existing| match existing {
                Value::Object(map) if item_id(existing) == Some(id) => {
                    let mut merged = map.clone();
                    for (name, field) in fields {
                        merged.insert(name.clone(), field.clone());
                    }
                    Value::Object(merged)
                }
                other => other.clone(),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn remove_by_id_handles_every_shape() {
        let bare = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(remove_by_id(&bare, &json!(1)), Some(json!([{"id": 2}])));

        let counted = json!({"items": [{"id": 1}, {"id": 2}], "total_count": 10});
        assert_eq!(
            remove_by_id(&counted, &json!(2)),
            Some(json!({"items": [{"id": 1}], "total_count": 9}))
        );

        let infinite = json!({
            "pages": [
                {"cursor": 0, "items": [{"id": 1}, {"id": 2}]},
                {"cursor": 2, "items": [{"id": 3}]}
            ],
            "next_cursor": 4
        });
        let next = remove_by_id(&infinite, &json!(3)).expect("infinite shape");
        assert_eq!(next["pages"][1]["items"], json!([]));
        assert_eq!(next["pages"][0]["items"], json!([{"id": 1}, {"id": 2}]));
        assert_eq!(next["next_cursor"], json!(4));
    }

    #[test]
    fn unknown_shapes_are_left_alone() {
        assert_eq!(remove_by_id(&json!({"id": 1}), &json!(1)), None);
        assert_eq!(remove_by_id(&json!("text"), &json!(1)), None);
    }

    #[test]
    fn append_counts_new_items_and_skips_infinite_lists() {
        let bare = json!([{"id": 1}]);
        assert_eq!(
            append(&bare, &json!({"id": 2})),
            Some(json!([{"id": 1}, {"id": 2}]))
        );

        let counted = json!({"items": [], "total_count": 0});
        let next = append(&counted, &json!({"id": 5})).expect("counted shape");
        assert_eq!(next["items"], json!([{"id": 5}]));
        assert_eq!(next["total_count"], json!(1));

        let infinite = json!({"pages": [], "next_cursor": 0});
        assert_eq!(append(&infinite, &json!({"id": 5})), None);
    }

    #[test]
    fn replace_and_patch_by_id() {
        let feeds = json!([{"id": 1, "is_active": 1, "url": "a"}, {"id": 2, "is_active": 1}]);

        let replaced = replace_by_id(&feeds, &json!({"id": 1, "is_active": 0, "url": "b"}));
        assert_eq!(replaced.expect("array")[0], json!({"id": 1, "is_active": 0, "url": "b"}));

        let patched = patch_by_id(&feeds, &json!(2), &json!({"is_active": 0})).expect("array");
        assert_eq!(patched[1], json!({"id": 2, "is_active": 0}));
        assert_eq!(patched[0]["is_active"], json!(1));
    }

    #[test]
    fn remove_where_matches_compound_identity() {
        let pending = json!({
            "items": [
                {"content_type": "lead", "content_id": 4},
                {"content_type": "reddit_post", "content_id": 4}
            ],
            "total_count": 2
        });
        let next = remove_where(&pending, |item| {
            item["content_type"] == "lead" && item["content_id"] == 4
        })
        .expect("counted shape");
        assert_eq!(next["total_count"], json!(1));
        assert_eq!(next["items"][0]["content_type"], json!("reddit_post"));
    }
}
