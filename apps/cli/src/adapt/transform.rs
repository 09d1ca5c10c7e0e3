//! Tree traversal — rewrites string leaves of a nested YAML value while
//! preserving the tree's shape exactly.

use serde_yaml::{Mapping, Value};

use crate::errors::AppError;

/// Depth-first traversal that replaces every string leaf with the result of
/// `rewrite` and passes every other scalar through unchanged.
///
/// The result has the same keys per mapping and the same length per sequence
/// as the input; only string leaf values change. Each string leaf is visited
/// exactly once, in a deterministic order, so two traversals of the same tree
/// observe the same leaves in the same sequence.
pub fn transform<F>(node: Value, rewrite: &mut F) -> Result<Value, AppError>
where
    F: FnMut(&str) -> Result<String, AppError>,
{
    match node {
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (key, value) in map {
                out.insert(key, transform(value, rewrite)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for value in seq {
                out.push(transform(value, rewrite)?);
            }
            Ok(Value::Sequence(out))
        }
        Value::String(text) => Ok(Value::String(rewrite(&text)?)),
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Number(n) => Ok(Value::Number(n)),
        // YAML tags do not occur in CV documents; carried through untouched.
        Value::Tagged(tagged) => Ok(Value::Tagged(tagged)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_identity_rewrite_returns_equal_tree() {
        let input = doc(
            r#"
            summary: Seasoned engineer
            experience:
              - title: Engineer
                years: 3
                current: true
              - title: Lead
                notes: ~
            skills: [rust, sql]
            "#,
        );
        let output = transform(input.clone(), &mut |s| Ok(s.to_string())).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_visits_each_string_leaf_exactly_once() {
        let input = doc(
            r#"
            a: [x, y]
            b:
              c: z
            "#,
        );

        let mut visited = Vec::new();
        let output = transform(input, &mut |s| {
            visited.push(s.to_string());
            Ok(format!("{s}!"))
        })
        .unwrap();

        assert_eq!(visited, vec!["x", "y", "z"]);
        assert_eq!(
            output,
            doc(
                r#"
                a: [x!, y!]
                b:
                  c: z!
                "#
            )
        );
    }

    #[test]
    fn test_shape_is_preserved() {
        let input = doc(
            r#"
            a: [x, y]
            b:
              c: z
            "#,
        );
        let output = transform(input.clone(), &mut |_| Ok("w".to_string())).unwrap();

        let keys = |v: &Value| -> Vec<String> {
            v.as_mapping()
                .unwrap()
                .keys()
                .map(|k| k.as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(keys(&input), keys(&output));
        assert_eq!(
            output.get("a").unwrap().as_sequence().unwrap().len(),
            input.get("a").unwrap().as_sequence().unwrap().len()
        );
    }

    #[test]
    fn test_non_string_scalars_are_not_visited() {
        let input = doc(
            r#"
            count: 3
            ratio: 0.5
            flag: false
            missing: ~
            "#,
        );

        let mut visits = 0;
        let output = transform(input.clone(), &mut |s| {
            visits += 1;
            Ok(s.to_string())
        })
        .unwrap();

        assert_eq!(visits, 0);
        assert_eq!(output, input);
    }

    #[test]
    fn test_mapping_keys_are_never_rewritten() {
        let input = doc("summary: old");
        let output = transform(input, &mut |_| Ok("new".to_string())).unwrap();
        assert_eq!(output, doc("summary: new"));
    }

    #[test]
    fn test_rewrite_error_propagates() {
        let input = doc("a: text");
        let result = transform(input, &mut |_| {
            Err(AppError::Config("boom".to_string()))
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
