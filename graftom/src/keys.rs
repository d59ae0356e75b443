use serde_json::Value;

/// Key-construction helpers for the Redis store.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    pub fn row(&self, table: &str, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, table, key)
    }

    /// Sorted set of the table's keys, scored by insertion order.
    pub fn table_index(&self, table: &str) -> String {
        format!("{}:{}:_keys", self.prefix, table)
    }

    pub fn sequence(&self, table: &str) -> String {
        format!("{}:{}:_seq", self.prefix, table)
    }
}

/// Canonical string form of a key value: `3`, `3.0` and `"3"` all map to `"3"`.
pub fn key_repr(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 9.0e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        },
        Value::Bool(flag) => String::from(if *flag { "1" } else { "0" }),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Loose equality used for key and foreign-key comparisons.
pub fn keys_match(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => key_repr(left) == key_repr(right),
    }
}

/// Null, empty strings and `false` do not address a row.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
