use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initializes the Snowflake id generator.
///
/// `machine_id` and `node_id` must both be in `0..=31`.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Returns a new Snowflake id as a decimal string.
///
/// Falls back to machine 1 / node 1 when [`init`] was never called.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_across_a_burst() {
        init(1, 1);
        let ids: HashSet<String> = (0..500).map(|_| next_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn ids_parse_as_i64() {
        let id = next_id();
        assert!(id.parse::<i64>().is_ok(), "not numeric: {id}");
    }
}
