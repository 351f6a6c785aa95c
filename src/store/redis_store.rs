use std::collections::HashMap;
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{EntityStore, StoreError, StoreResult};
use crate::model::{EntityHeader, EntityId, Sample, TrackedEntity, TOP_ITEMS_LIMIT};
use crate::range::TimeRange;

// ─── Key layout ──────────────────────────────────────────────────
//
//   {p}:entities                       LIST   entity ids in creation order
//   {p}:pair:{len(region)}:{region}:{query}
//                                      STRING id owning the pair
//   {p}:entity:{id}                    HASH   id, region, query, created_at
//   {p}:entity:{id}:samples            ZSET   score = timestamp,
//                                             member = "{seq:020}|{json}"
//   {p}:entity:{id}:top                STRING JSON array of item references
//
// The zero-padded sequence keeps members unique and orders samples with
// equal timestamps by insertion.

const DEFAULT_PREFIX: &str = "tracker";

#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn entities(&self) -> String {
        format!("{}:entities", self.prefix)
    }

    /// The region length makes the key unambiguous when either part
    /// contains a colon.
    fn pair(&self, region: &str, query: &str) -> String {
        format!("{}:pair:{}:{region}:{query}", self.prefix, region.len())
    }

    fn entity(&self, id: impl Display) -> String {
        format!("{}:entity:{id}", self.prefix)
    }

    fn samples(&self, id: EntityId) -> String {
        format!("{}:entity:{id}:samples", self.prefix)
    }

    fn top(&self, id: EntityId) -> String {
        format!("{}:entity:{id}:top", self.prefix)
    }
}

/// Claims the pair and writes the whole record in one step. Replies with
/// the owning id when the pair is taken, with `""` when the entity was
/// created.
const CREATE_ENTITY_LUA: &str = r#"
local owner = redis.call('GET', KEYS[1])
if owner then
    return owner
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[3], 'id', ARGV[1], 'region', ARGV[2], 'query', ARGV[3], 'created_at', ARGV[4])
redis.call('SET', KEYS[4], '[]')
redis.call('RPUSH', KEYS[2], ARGV[1])
return ''
"#;

/// Appends only if the entity exists and the new timestamp is not older
/// than the current tail. Replies `{0, ""}` on success, `{-1, ""}` for a
/// missing entity and `{-2, <last timestamp>}` for an out-of-order sample.
const APPEND_SAMPLE_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {-1, ''}
end
local tail = redis.call('ZRANGE', KEYS[2], -1, -1, 'WITHSCORES')
if #tail > 0 and tonumber(tail[2]) > tonumber(ARGV[2]) then
    return {-2, tail[2]}
end
local seq = redis.call('ZCARD', KEYS[2])
redis.call('ZADD', KEYS[2], ARGV[2], string.format('%020d', seq) .. '|' .. ARGV[1])
return {0, ''}
"#;

/// Durable store on top of a shared Redis connection.
///
/// `ConnectionManager` is cheaply cloneable and every clone shares the same
/// multiplexed connection, so each call clones it instead of pooling.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    keys: Keys,
    create_script: Script,
    append_script: Script,
}

impl RedisStore {
    /// Opens a connection manager that reconnects on failure.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Backend(format!("invalid Redis URL \"{url}\": {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(format!("cannot connect to Redis at {url}: {e}")))?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            keys: Keys {
                prefix: DEFAULT_PREFIX.to_owned(),
            },
            create_script: Script::new(CREATE_ENTITY_LUA),
            append_script: Script::new(APPEND_SAMPLE_LUA),
        }
    }

    /// Namespaces every key under `prefix` instead of `tracker`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys.prefix = prefix.into();
        self
    }

    async fn ensure_exists(&self, id: EntityId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.keys.entity(id)).await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

#[async_trait]
impl EntityStore for RedisStore {
    async fn create(&self, region: &str, query: &str) -> StoreResult<EntityId> {
        let mut conn = self.conn.clone();
        let id = EntityId::new();
        let pair = self.keys.pair(region, query);

        let owner: String = self
            .create_script
            .key(&pair)
            .key(self.keys.entities())
            .key(self.keys.entity(id))
            .key(self.keys.top(id))
            .arg(id.to_string())
            .arg(region)
            .arg(query)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if owner.is_empty() {
            return Ok(id);
        }
        let existing = owner
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("pair key {pair}: {e}")))?;
        Err(StoreError::AlreadyExists {
            existing,
            region: region.to_owned(),
            query: query.to_owned(),
        })
    }

    async fn get(&self, id: EntityId) -> StoreResult<TrackedEntity> {
        let mut conn = self.conn.clone();
        let (fields, members, raw_top): (HashMap<String, String>, Vec<String>, Option<String>) =
            redis::pipe()
                .atomic()
                .hgetall(self.keys.entity(id))
                .zrange(self.keys.samples(id), 0, -1)
                .get(self.keys.top(id))
                .query_async(&mut conn)
                .await?;

        if fields.is_empty() {
            return Err(StoreError::NotFound(id));
        }

        Ok(TrackedEntity {
            header: header_from_map(&fields)?,
            samples: decode_samples(&members)?,
            top_items: decode_top(raw_top.as_deref())?,
        })
    }

    async fn append_sample(&self, id: EntityId, sample: Sample) -> StoreResult<()> {
        if !sample.timestamp.is_finite() {
            return Err(StoreError::Corrupt(format!(
                "non-finite sample timestamp {}",
                sample.timestamp
            )));
        }

        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(&sample)?;
        let (status, last): (i64, String) = self
            .append_script
            .key(self.keys.entity(id))
            .key(self.keys.samples(id))
            .arg(encoded)
            .arg(sample.timestamp.to_string())
            .invoke_async(&mut conn)
            .await?;

        match status {
            0 => Ok(()),
            -1 => Err(StoreError::NotFound(id)),
            -2 => Err(StoreError::OutOfOrder {
                last: last.parse().unwrap_or(f64::NAN),
                attempted: sample.timestamp,
            }),
            other => Err(StoreError::Backend(format!(
                "append script replied with unknown status {other}"
            ))),
        }
    }

    async fn set_top_items(&self, id: EntityId, mut items: Vec<String>) -> StoreResult<()> {
        self.ensure_exists(id).await?;
        items.truncate(TOP_ITEMS_LIMIT);
        let encoded = serde_json::to_string(&items)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.keys.top(id), encoded).await?;
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<EntityHeader>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(self.keys.entities(), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for raw in &ids {
            pipe.hgetall(self.keys.entity(raw));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        maps.iter()
            .filter(|fields| !fields.is_empty())
            .map(header_from_map)
            .collect()
    }

    /// One `ZRANGEBYSCORE` over the sample set: O(log n + k) on the server,
    /// only the matching samples cross the wire.
    async fn samples_in_range(&self, id: EntityId, range: TimeRange) -> StoreResult<Vec<Sample>> {
        if range.is_empty() {
            self.ensure_exists(id).await?;
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let (exists, members): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(self.keys.entity(id))
            .zrangebyscore(
                self.keys.samples(id),
                score_bound(range.start),
                score_bound(range.end),
            )
            .query_async(&mut conn)
            .await?;

        if !exists {
            return Err(StoreError::NotFound(id));
        }
        decode_samples(&members)
    }

    async fn top_items(&self, id: EntityId) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let (exists, raw_top): (bool, Option<String>) = redis::pipe()
            .atomic()
            .exists(self.keys.entity(id))
            .get(self.keys.top(id))
            .query_async(&mut conn)
            .await?;

        if !exists {
            return Err(StoreError::NotFound(id));
        }
        decode_top(raw_top.as_deref())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Inclusive score bound in the syntax `ZRANGEBYSCORE` accepts.
fn score_bound(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else {
        value.to_string()
    }
}

fn header_from_map(map: &HashMap<String, String>) -> StoreResult<EntityHeader> {
    let field = |name: &str| {
        map.get(name)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!("entity hash lacks field '{name}'")))
    };

    let id = field("id")?
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("entity hash: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&field("created_at")?)
        .map_err(|e| StoreError::Corrupt(format!("entity hash created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(EntityHeader {
        id,
        region: field("region")?,
        query: field("query")?,
        created_at,
    })
}

fn decode_samples(members: &[String]) -> StoreResult<Vec<Sample>> {
    members
        .iter()
        .map(|member| {
            let (_seq, json) = member
                .split_once('|')
                .ok_or_else(|| StoreError::Corrupt(format!("sample member '{member}' lacks a sequence")))?;
            Ok(serde_json::from_str(json)?)
        })
        .collect()
}

fn decode_top(raw: Option<&str>) -> StoreResult<Vec<String>> {
    match raw {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Keys {
        Keys {
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }

    #[test]
    fn keys_are_namespaced_per_entity() {
        let keys = keys();
        let id: EntityId = "5f0c6c2b9a4e4b7f8d3a2e1f0b9c8d7e".parse().unwrap();
        assert_eq!(keys.entity(id), "tracker:entity:5f0c6c2b9a4e4b7f8d3a2e1f0b9c8d7e");
        assert_eq!(keys.samples(id), format!("{}:samples", keys.entity(id)));
        assert_eq!(keys.top(id), format!("{}:top", keys.entity(id)));
        assert_eq!(keys.pair("moskva", "iphone 15"), "tracker:pair:6:moskva:iphone 15");
    }

    #[test]
    fn pair_keys_do_not_collide_across_the_separator() {
        let keys = keys();
        assert_ne!(keys.pair("a:b", "c"), keys.pair("a", "b:c"));
        assert_ne!(keys.pair("", "a:b"), keys.pair("a", "b"));
    }

    #[test]
    fn prefix_moves_every_key() {
        let keys = Keys {
            prefix: "test-1".to_owned(),
        };
        let id = EntityId::new();
        assert!(keys.entities().starts_with("test-1:"));
        assert!(keys.pair("spb", "lada").starts_with("test-1:"));
        assert!(keys.samples(id).starts_with("test-1:"));
    }

    #[test]
    fn infinite_bounds_use_redis_syntax() {
        assert_eq!(score_bound(f64::INFINITY), "+inf");
        assert_eq!(score_bound(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_bound(150.0), "150");
        assert_eq!(score_bound(1_700_000_000.25), "1700000000.25");
    }

    #[test]
    fn header_round_trips_through_hash_fields() {
        let id = EntityId::new();
        let now = Utc::now();
        let map: HashMap<String, String> = [
            ("id", id.to_string()),
            ("region", "moskva".into()),
            ("query", "iphone".into()),
            ("created_at", now.to_rfc3339()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let header = header_from_map(&map).unwrap();
        assert_eq!(header.id, id);
        assert_eq!(header.region, "moskva");
        assert_eq!(header.created_at, now);
    }

    #[test]
    fn header_with_missing_field_is_corrupt() {
        let map: HashMap<String, String> = [("region".to_string(), "moskva".to_string())]
            .into_iter()
            .collect();
        assert!(matches!(header_from_map(&map), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn stored_members_decode_including_gaps() {
        let raw = vec![
            r#"00000000000000000000|{"timestamp":100.0,"count":5}"#.to_string(),
            r#"00000000000000000001|{"timestamp":300.0,"count":null}"#.to_string(),
        ];
        let samples = decode_samples(&raw).unwrap();
        assert_eq!(samples, vec![Sample::recorded(100.0, 5), Sample::gap(300.0)]);
        assert!(decode_samples(&["nope".to_string()]).is_err());
        assert!(decode_samples(&[r#"{"timestamp":1.0,"count":1}"#.to_string()]).is_err());
    }

    #[test]
    fn missing_top_snapshot_reads_as_empty() {
        assert!(decode_top(None).unwrap().is_empty());
        assert_eq!(decode_top(Some(r#"["/a","/b"]"#)).unwrap(), vec!["/a", "/b"]);
    }
}
