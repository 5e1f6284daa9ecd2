//! Operation tree: what the resolver hands to the data engine for one nested write.
//!
//! Serialized shape per relation field:
//! `{create: [...], connect: [...], update: [{match, data}], disconnect: [...], deleteMany: {<key>: {in: [...]}}}`
//! for list relations, `{create: {...}}` / `{connect: {...}}` / `{update: {match, data}}` for
//! singular ones. Empty buckets are left out.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type Record = Map<String, Value>;

/// Data for one record: plain columns plus the resolved writes of its relation fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteData {
    pub scalars: Record,
    pub relations: BTreeMap<String, RelationWrite>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RelationWrite {
    List(ListOps),
    Single(SingleOp),
    /// `null` or anything the resolver does not interpret; forwarded unchanged.
    Passthrough(Value),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListOps {
    pub create: Vec<WriteData>,
    pub connect: Vec<Record>,
    pub update: Vec<UpdateOp>,
    pub disconnect: Vec<Record>,
    pub delete_many: Option<DeleteMany>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SingleOp {
    Create(WriteData),
    Connect(Record),
    Update(UpdateOp),
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOp {
    pub match_: Record,
    pub data: WriteData,
}

/// One batched delete per relation: every identifier tagged for deletion.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteMany {
    pub key: String,
    pub values: Vec<Value>,
}

impl WriteData {
    pub fn from_scalars(scalars: Record) -> Self {
        WriteData {
            scalars,
            relations: BTreeMap::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.scalars.clone();
        for (name, write) in &self.relations {
            map.insert(name.clone(), write.to_value());
        }
        Value::Object(map)
    }
}

impl RelationWrite {
    pub fn to_value(&self) -> Value {
        match self {
            RelationWrite::List(ops) => ops.to_value(),
            RelationWrite::Single(op) => op.to_value(),
            RelationWrite::Passthrough(v) => v.clone(),
        }
    }
}

impl ListOps {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.connect.is_empty()
            && self.update.is_empty()
            && self.disconnect.is_empty()
            && self.delete_many.is_none()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if !self.create.is_empty() {
            map.insert(
                "create".into(),
                Value::Array(self.create.iter().map(WriteData::to_value).collect()),
            );
        }
        if !self.connect.is_empty() {
            map.insert(
                "connect".into(),
                Value::Array(self.connect.iter().cloned().map(Value::Object).collect()),
            );
        }
        if !self.update.is_empty() {
            map.insert(
                "update".into(),
                Value::Array(self.update.iter().map(UpdateOp::to_value).collect()),
            );
        }
        if !self.disconnect.is_empty() {
            map.insert(
                "disconnect".into(),
                Value::Array(self.disconnect.iter().cloned().map(Value::Object).collect()),
            );
        }
        if let Some(dm) = &self.delete_many {
            map.insert("deleteMany".into(), dm.to_value());
        }
        Value::Object(map)
    }
}

impl SingleOp {
    pub fn to_value(&self) -> Value {
        let (key, inner) = match self {
            SingleOp::Create(data) => ("create", data.to_value()),
            SingleOp::Connect(record) => ("connect", Value::Object(record.clone())),
            SingleOp::Update(op) => ("update", op.to_value()),
        };
        let mut map = Map::new();
        map.insert(key.into(), inner);
        Value::Object(map)
    }
}

impl UpdateOp {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("match".into(), Value::Object(self.match_.clone()));
        map.insert("data".into(), self.data.to_value());
        Value::Object(map)
    }
}

impl DeleteMany {
    pub fn to_value(&self) -> Value {
        let mut set = Map::new();
        set.insert("in".into(), Value::Array(self.values.clone()));
        let mut map = Map::new();
        map.insert(self.key.clone(), Value::Object(set));
        Value::Object(map)
    }
}

impl Serialize for WriteData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Serialize for RelationWrite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
