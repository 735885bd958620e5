// used for persistence
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use tracing::debug;

use crate::construct::{Atom, EntityId, IDENTITY_ATTRIBUTE, Pattern};
use crate::datatype::Value;
use crate::error::{GraphiteError, Result};
use crate::store::{AtomListing, AtomStore, Direction, StoreKind};

const INSERT_ATOM: &str = "
    insert into atoms (
        e, a, v, vt, t, o
    ) values (?, ?, ?, ?, ?, ?)
";
const SELECT_ATOMS: &str = "select e, a, v, vt, t, o from atoms";

type RawAtom = (EntityId, EntityId, SqlValue, u8, EntityId, EntityId);

fn read_raw(row: &Row) -> rusqlite::Result<RawAtom> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_atom((e, a, raw, vt, t, o): RawAtom) -> Result<Atom> {
    Ok(Atom::new(e, a, Value::from_sql(raw, vt)?, t, o))
}

fn sql_id(id: EntityId) -> Result<SqlValue> {
    i64::try_from(id)
        .map(SqlValue::Integer)
        .map_err(|_| GraphiteError::Persistence(format!("entity id {id} exceeds the storable range")))
}

fn sql_value(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(x) => SqlValue::Real(*x),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Ref(e) => sql_id(*e)?,
    })
}

/// Atoms kept in a single SQLite table, one row per atom, in insertion order.
pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<SqliteStore> {
        debug!(path = %path.as_ref().display(), "opening sqlite atom store");
        Self::with_connection(Connection::open(path)?)
    }
    pub fn open_in_memory() -> Result<SqliteStore> {
        Self::with_connection(Connection::open_in_memory()?)
    }
    fn with_connection(connection: Connection) -> Result<SqliteStore> {
        // v is declared blob so that SQLite applies no affinity and stores
        // every value with the storage class it was bound with
        connection.execute_batch(
            "
            create table if not exists atoms (
                e integer not null,
                a integer not null,
                v blob,
                vt integer not null,
                t integer not null,
                o integer not null
            );
            create index if not exists eavt on atoms (e, a, v, t);
            create index if not exists aevt on atoms (a, e, v, t);
            create index if not exists vaet on atoms (v, a, e, t);
            create index if not exists avet on atoms (a, v, e, t);
            create index if not exists teav on atoms (t, e, a, v);
            ",
        )?;
        Ok(SqliteStore { connection })
    }
    fn collect(&self, sql: &str, args: Vec<SqlValue>) -> Result<Vec<Atom>> {
        let mut statement = self.connection.prepare_cached(sql)?;
        let rows = statement.query_map(params_from_iter(args.iter()), read_raw)?;
        let mut atoms = Vec::new();
        for row in rows {
            atoms.push(into_atom(row?)?);
        }
        Ok(atoms)
    }
    fn max_of(&self, column: &str) -> Result<Option<EntityId>> {
        Ok(self
            .connection
            .query_row(&format!("select max({column}) from atoms"), [], |row| {
                row.get::<_, Option<EntityId>>(0)
            })?)
    }
}

impl AtomStore for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }
    fn insert(&mut self, atom: &Atom) -> Result<()> {
        self.connection.prepare_cached(INSERT_ATOM)?.execute(params![
            atom.e(),
            atom.a(),
            atom.v(),
            atom.v().tag(),
            atom.t(),
            atom.o()
        ])?;
        Ok(())
    }
    fn insert_batch(&mut self, atoms: &[Atom]) -> Result<()> {
        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare_cached(INSERT_ATOM)?;
            for atom in atoms {
                statement.execute(params![
                    atom.e(),
                    atom.a(),
                    atom.v(),
                    atom.v().tag(),
                    atom.t(),
                    atom.o()
                ])?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
    fn lookup(&self, pattern: &Pattern, as_of: EntityId) -> Result<Vec<Atom>> {
        let mut sql = format!("{SELECT_ATOMS} where t <= ?");
        let mut args = vec![sql_id(as_of)?];
        for (column, bound) in [("e", pattern.e), ("a", pattern.a), ("t", pattern.t), ("o", pattern.o)] {
            if let Some(id) = bound {
                sql.push_str(&format!(" and {column} = ?"));
                args.push(sql_id(id)?);
            }
        }
        if let Some(value) = &pattern.v {
            let tags: Vec<String> = value.matching_tags().iter().map(u8::to_string).collect();
            sql.push_str(&format!(" and v = ? and vt in ({})", tags.join(", ")));
            args.push(sql_value(value)?);
        }
        sql.push_str(" order by rowid");
        self.collect(&sql, args)
    }
    fn max_transaction_id(&self) -> Result<Option<EntityId>> {
        self.max_of("t")
    }
    fn max_entity_id(&self) -> Result<Option<EntityId>> {
        self.max_of("e")
    }
    fn identity_of(&self, entity: EntityId) -> Result<Option<String>> {
        Ok(self
            .connection
            .prepare_cached(
                "select v from atoms where e = ? and a = ? and vt = ? order by rowid limit 1",
            )?
            .query_row(params![entity, IDENTITY_ATTRIBUTE, Value::TEXT], |row| {
                row.get::<_, String>(0)
            })
            .optional()?)
    }
    fn entity_of(&self, identity: &str) -> Result<EntityId> {
        self.connection
            .prepare_cached(
                "select e from atoms where a = ? and v = ? and vt = ? order by rowid limit 1",
            )?
            .query_row(params![IDENTITY_ATTRIBUTE, identity, Value::TEXT], |row| {
                row.get::<_, EntityId>(0)
            })
            .optional()?
            .ok_or_else(|| GraphiteError::UnknownIdentity(identity.to_owned()))
    }
    fn count_atoms(&self, entity: EntityId) -> Result<usize> {
        Ok(self
            .connection
            .prepare_cached("select count(*) from atoms where e = ?")?
            .query_row(params![entity], |row| row.get::<_, usize>(0))?)
    }
    fn atom_count(&self) -> Result<usize> {
        Ok(self
            .connection
            .query_row("select count(*) from atoms", [], |row| row.get::<_, usize>(0))?)
    }
    fn identities(&self) -> Result<Vec<(EntityId, String)>> {
        let mut statement = self.connection.prepare_cached(
            "select e, v from atoms where a = ? and vt = ? order by rowid",
        )?;
        let rows = statement.query_map(params![IDENTITY_ATTRIBUTE, Value::TEXT], |row| {
            Ok((row.get::<_, EntityId>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
    fn atoms(&self, listing: &AtomListing) -> Result<Vec<Atom>> {
        let mut sql = String::from(SELECT_ATOMS);
        let mut args = Vec::new();
        match listing.sort {
            Some(column) => {
                let direction = match listing.direction.unwrap_or_default() {
                    Direction::Asc => "asc",
                    Direction::Desc => "desc",
                };
                sql.push_str(&format!(" order by {} {direction}, rowid", column.name()));
            }
            None => sql.push_str(" order by rowid"),
        }
        match (listing.limit, listing.offset) {
            (Some(limit), _) => {
                sql.push_str(" limit ?");
                args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            }
            (None, Some(_)) => sql.push_str(" limit -1"),
            (None, None) => {}
        }
        if let Some(offset) = listing.offset {
            sql.push_str(" offset ?");
            args.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        }
        self.collect(&sql, args)
    }
    fn reset(&mut self) -> Result<()> {
        self.connection.execute("delete from atoms", [])?;
        Ok(())
    }
    fn transient(&self) -> Result<Box<dyn AtomStore>> {
        Ok(Box::new(SqliteStore::open_in_memory()?))
    }
}
