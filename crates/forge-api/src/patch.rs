use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The JSON-Patch subset the PATCH endpoints accept: `add`, `replace` and
/// `remove` over object members (no array paths).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } => path,
            PatchOp::Replace { path, .. } => path,
            PatchOp::Remove { path } => path,
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid patch: {0}")]
pub struct PatchError(pub String);

fn split_path(path: &str) -> Result<Vec<String>, PatchError> {
    let mut parts = path.split('/');
    if parts.next() != Some("") {
        return Err(PatchError(format!("path must start with '/': {path}")));
    }
    let tokens: Vec<String> = parts
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    if tokens.is_empty() || tokens.iter().any(|t| t.is_empty()) {
        return Err(PatchError(format!("malformed path: {path}")));
    }
    Ok(tokens)
}

// Walk to the parent object of the path's leaf token.
fn parent<'a>(doc: &'a mut Value, tokens: &[String]) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for token in &tokens[..tokens.len() - 1] {
        current = current
            .get_mut(token.as_str())
            .ok_or_else(|| PatchError(format!("no such member: {token}")))?;
    }
    if current.is_object() {
        Ok(current)
    } else {
        Err(PatchError("path does not address an object member".into()))
    }
}

/// Apply `ops` to `doc` in order, failing on the first bad op.
pub fn apply(doc: &mut Value, ops: &[PatchOp]) -> Result<(), PatchError> {
    for op in ops {
        let tokens = split_path(op.path())?;
        let target = parent(doc, &tokens)?;
        let map = target
            .as_object_mut()
            .ok_or_else(|| PatchError("path does not address an object member".into()))?;
        let leaf = &tokens[tokens.len() - 1];
        match op {
            PatchOp::Add { value, .. } => {
                map.insert(leaf.clone(), value.clone());
            }
            PatchOp::Replace { value, .. } => {
                if !map.contains_key(leaf) {
                    return Err(PatchError(format!("no such member: {leaf}")));
                }
                map.insert(leaf.clone(), value.clone());
            }
            PatchOp::Remove { .. } => {
                // removing a nullable scalar clears it; removing a missing
                // mapping key is the error RFC 6902 says it is
                if map.remove(leaf).is_none() {
                    return Err(PatchError(format!("no such member: {leaf}")));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({ "description": "rack 1", "extra": { "row": "a" } })
    }

    #[test]
    fn replace_top_level_member() {
        let mut d = doc();
        let ops = vec![PatchOp::Replace {
            path: "/description".into(),
            value: json!("rack 2"),
        }];
        apply(&mut d, &ops).unwrap();
        assert_eq!(d["description"], "rack 2");
    }

    #[test]
    fn add_and_remove_nested_member() {
        let mut d = doc();
        apply(
            &mut d,
            &[PatchOp::Add {
                path: "/extra/position".into(),
                value: json!(7),
            }],
        )
        .unwrap();
        assert_eq!(d["extra"]["position"], 7);

        apply(
            &mut d,
            &[PatchOp::Remove {
                path: "/extra/row".into(),
            }],
        )
        .unwrap();
        assert!(d["extra"].get("row").is_none());
    }

    #[test]
    fn replace_missing_member_fails() {
        let mut d = doc();
        let err = apply(
            &mut d,
            &[PatchOp::Replace {
                path: "/bogus".into(),
                value: json!(1),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn escaped_tokens_resolve() {
        let mut d = json!({ "extra": { "a/b": 1, "c~d": 2 } });
        apply(
            &mut d,
            &[
                PatchOp::Replace {
                    path: "/extra/a~1b".into(),
                    value: json!(10),
                },
                PatchOp::Remove {
                    path: "/extra/c~0d".into(),
                },
            ],
        )
        .unwrap();
        assert_eq!(d["extra"]["a/b"], 10);
        assert!(d["extra"].get("c~d").is_none());
    }

    #[test]
    fn path_must_be_rooted() {
        let mut d = doc();
        assert!(apply(
            &mut d,
            &[PatchOp::Remove {
                path: "description".into()
            }]
        )
        .is_err());
    }
}
