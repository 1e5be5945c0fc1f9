//! Per-call identity state and the cycle resolver.
//!
//! A [`Session`] lives for exactly one `serialize` or `deserialize` call.
//! On encode it maps object identities to ids so later encounters emit
//! back-references; on decode it maps ids to [`ReferenceRecord`]s whose
//! pending callbacks are the cycle-breaking mechanism: a reference that
//! arrives before its target finishes construction parks a patch closure
//! on the record and is satisfied, FIFO, the moment the record settles.
//!
//! The [`RegistrationTable`] is the longer-lived sibling: caller-managed,
//! shared across calls, holding identities that must never be deep-copied.

use std::collections::{HashMap, VecDeque};

use crate::error::DeserializeError;
use crate::object::{obj_addr, ObjRef};
use crate::types::TypeDesc;
use crate::value::Value;

/// Session-scoped identity of an encodable thing: a heap address for
/// objects and shared containers, a canonical name for type descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Address(usize),
    Type(String),
}

/// The identity key of a value, if the value carries identity.
/// Records and member handles are plain data and always encode fresh.
pub fn identity_key(value: &Value) -> Option<IdentityKey> {
    match value {
        Value::Object(o) => Some(IdentityKey::Address(obj_addr(o))),
        Value::List(l) => Some(IdentityKey::Address(std::rc::Rc::as_ptr(l) as usize)),
        Value::Map(m) => Some(IdentityKey::Address(std::rc::Rc::as_ptr(m) as usize)),
        Value::TypeRef(td) => Some(IdentityKey::Type(td.key())),
        _ => None,
    }
}

/// A patch closure parked on an unsettled record. Invoked exactly once with
/// the final value; follow-on settlements are pushed onto the queue instead
/// of recursing into the session.
pub type Callback = Box<dyn FnOnce(&Value, &mut SettleQueue)>;

/// Settlements produced while draining callbacks, processed FIFO.
#[derive(Default)]
pub struct SettleQueue {
    items: VecDeque<(u32, Value)>,
}

impl SettleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u32, value: Value) {
        self.items.push_back((id, value));
    }

    fn pop(&mut self) -> Option<(u32, Value)> {
        self.items.pop_front()
    }
}

/// One decoded identity: unsettled while its target is under construction,
/// then settled exactly once.
#[derive(Default)]
struct ReferenceRecord {
    value: Option<Value>,
    settled: bool,
    pending: Vec<Callback>,
}

/// Ephemeral identity state for a single serialize or deserialize call.
#[derive(Default)]
pub struct Session {
    next_id: u32,
    /// Encode direction: identity -> assigned id.
    ids: HashMap<IdentityKey, u32>,
    /// Decode direction: id -> record.
    records: HashMap<u32, ReferenceRecord>,
    /// Keeps encoded handles alive so addresses stay unique for the session.
    retained: Vec<Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // -- encode direction ---------------------------------------------------

    /// The id previously assigned to this identity, if any.
    pub fn lookup(&self, key: &IdentityKey) -> Option<u32> {
        self.ids.get(key).copied()
    }

    /// Assign the next id, recording the identity if it has one.
    pub fn assign(&mut self, key: Option<IdentityKey>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(key) = key {
            self.ids.insert(key, id);
        }
        id
    }

    /// Keep a value's allocation alive for the rest of the session.
    pub fn retain(&mut self, value: Value) {
        self.retained.push(value);
    }

    // -- decode direction ---------------------------------------------------

    /// Create the unsettled record for a `NEW` definition.
    pub fn create_record(&mut self, id: u32) -> Result<(), DeserializeError> {
        if self
            .records
            .insert(id, ReferenceRecord::default())
            .is_some()
        {
            return Err(DeserializeError::Corrupt(format!(
                "definition id {id} appears twice"
            )));
        }
        Ok(())
    }

    pub fn is_settled(&self, id: u32) -> bool {
        self.records.get(&id).is_some_and(|r| r.settled)
    }

    /// The settled value of a record, if it exists and has settled.
    pub fn settled_value(&self, id: u32) -> Option<Value> {
        self.records
            .get(&id)
            .filter(|r| r.settled)
            .and_then(|r| r.value.clone())
    }

    /// Resolve a reference to `id`: run the callback now if the record has
    /// settled, otherwise park it on the record.
    pub fn attach(&mut self, id: u32, callback: Callback) -> Result<(), DeserializeError> {
        let value = {
            let record = self
                .records
                .get_mut(&id)
                .ok_or(DeserializeError::UnknownReference(id))?;
            if !record.settled {
                record.pending.push(callback);
                return Ok(());
            }
            record.value.clone().unwrap_or(Value::Null)
        };
        self.run(callback, &value);
        Ok(())
    }

    /// Settle a record and drain its pending callbacks (and any settlements
    /// those callbacks produce) in FIFO order.
    pub fn settle(&mut self, id: u32, value: Value) {
        let mut queue = SettleQueue::new();
        queue.push(id, value);
        self.drain(queue);
    }

    /// Run a resolution callback immediately, then process any settlements
    /// it produced.
    pub fn run(&mut self, callback: Callback, value: &Value) {
        let mut queue = SettleQueue::new();
        callback(value, &mut queue);
        self.drain(queue);
    }

    fn drain(&mut self, mut queue: SettleQueue) {
        while let Some((id, value)) = queue.pop() {
            let pending = match self.records.get_mut(&id) {
                Some(record) if !record.settled => {
                    record.settled = true;
                    record.value = Some(value.clone());
                    std::mem::take(&mut record.pending)
                }
                _ => continue,
            };
            for callback in pending {
                callback(&value, &mut queue);
            }
        }
    }
}

/// Caller-managed identity map for objects and type handles that must be
/// referenced by id but never structurally encoded or reconstructed.
/// Survives across calls; cleared explicitly.
#[derive(Default)]
pub struct RegistrationTable {
    next_id: u32,
    ids: HashMap<IdentityKey, u32>,
    values: HashMap<u32, Value>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: IdentityKey, value: Value) -> u32 {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(key, id);
        self.values.insert(id, value);
        id
    }

    /// Pre-register an object. Registering the same object again returns
    /// the existing id.
    pub fn register_object(&mut self, handle: ObjRef) -> u32 {
        let key = IdentityKey::Address(obj_addr(&handle));
        self.insert(key, Value::Object(handle))
    }

    /// Pre-register a type handle.
    pub fn register_type(&mut self, ty: TypeDesc) -> u32 {
        let key = IdentityKey::Type(ty.key());
        self.insert(key, Value::TypeRef(ty))
    }

    pub fn id_of(&self, key: &IdentityKey) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn value(&self, id: u32) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn clear(&mut self) {
        self.next_id = 0;
        self.ids.clear();
        self.values.clear();
    }
}
