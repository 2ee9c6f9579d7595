//! redb table definitions for the stepshift state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized types).

use redb::TableDefinition;

/// Shape shared by every JSON record table.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Latest unversioned definition keyed by `{resource}`.
pub const DEFINITIONS: RecordTable = TableDefinition::new("definitions");

/// Published versions keyed by `{version_id}`.
pub const VERSIONS: RecordTable = TableDefinition::new("versions");

/// Last issued version sequence keyed by `{resource}`.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Alias routing keyed by `{resource}:{alias}`.
pub const ALIASES: RecordTable = TableDefinition::new("aliases");

/// Alarm conditions keyed by `{name}`.
pub const ALARMS: RecordTable = TableDefinition::new("alarms");
