/// SQL DDL for the orchestrator document store.
///
/// Keys are canonical JSON objects so partial-key lookups can use JSON1
/// `json_extract`. `arity` is the number of key fields; a row is a child of
/// another when its arity is larger and it agrees on every parent field.

pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key_json TEXT NOT NULL,
    arity INTEGER NOT NULL,
    tag TEXT NOT NULL,
    value_json TEXT NOT NULL,
    index_json TEXT NOT NULL DEFAULT '{}',
    version INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, key_json, tag)
);

-- Opaque payloads (chart and profile tarballs) under the same addressing
CREATE TABLE IF NOT EXISTS blobs (
    collection TEXT NOT NULL,
    key_json TEXT NOT NULL,
    tag TEXT NOT NULL,
    data BLOB NOT NULL,
    size INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, key_json, tag)
);
";

pub const CREATE_INDEXES_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_documents_tag ON documents(collection, tag, arity);
CREATE INDEX IF NOT EXISTS idx_documents_arity ON documents(collection, arity);
";
