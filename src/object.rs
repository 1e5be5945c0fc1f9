//! Graph object handles and downcasting.
//!
//! Persisted graph nodes live behind [`ObjRef`] (`Rc<RefCell<dyn Persist>>`)
//! so that identity is the allocation address: two fields holding clones of
//! the same `Rc` are the *same* object to the engine, and deferred patch
//! callbacks can mutate an object after it has been linked into its parent.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::error::MemberError;

/// A type that can participate in graph persistence.
///
/// Implementations only expose their concrete runtime type; the member
/// structure itself lives in the statically registered
/// [`TypeSchema`](crate::schema::TypeSchema).
pub trait Persist: Any {
    /// The stable schema name of the concrete runtime type. This is what
    /// the wire records for polymorphic slots, so it must match the name
    /// the type was registered under.
    fn schema_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared, mutable handle to a persisted graph node.
pub type ObjRef = Rc<RefCell<dyn Persist>>;

/// Wrap a concrete value into a graph handle.
pub fn obj<T: Persist>(value: T) -> ObjRef {
    Rc::new(RefCell::new(value))
}

/// The identity address of a handle (stable while the `Rc` is alive).
pub fn obj_addr(handle: &ObjRef) -> usize {
    Rc::as_ptr(handle) as *const () as usize
}

/// Whether two handles point at the same allocation.
pub fn same_object(a: &ObjRef, b: &ObjRef) -> bool {
    obj_addr(a) == obj_addr(b)
}

/// Borrow a handle as its concrete type.
pub fn downcast_ref<T: Persist>(handle: &ObjRef) -> Option<Ref<'_, T>> {
    Ref::filter_map(handle.borrow(), |p| p.as_any().downcast_ref::<T>()).ok()
}

/// Mutably borrow a handle as its concrete type.
pub fn downcast_mut<T: Persist>(handle: &ObjRef) -> Option<RefMut<'_, T>> {
    RefMut::filter_map(handle.borrow_mut(), |p| p.as_any_mut().downcast_mut::<T>()).ok()
}

/// Downcast helper for accessor implementations.
pub fn concrete<T: Persist>(instance: &dyn Persist) -> Result<&T, MemberError> {
    instance
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| MemberError::wrong_instance(std::any::type_name::<T>()))
}

/// Mutable downcast helper for accessor implementations.
pub fn concrete_mut<T: Persist>(instance: &mut dyn Persist) -> Result<&mut T, MemberError> {
    instance
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| MemberError::wrong_instance(std::any::type_name::<T>()))
}
