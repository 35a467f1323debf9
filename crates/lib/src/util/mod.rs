//! Small shared utilities.

pub mod hash;
pub mod paths;

use std::sync::Arc;

/// Nil-tolerant deep equality for optional shared entities: equal when both
/// absent, or when both present and either pointer-equal or value-equal.
pub fn arc_equals<T: PartialEq>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
    _ => false,
  }
}

/// Serialize a `Mutex<T>` as its contents.
pub mod mutex_serde {
  use std::sync::Mutex;

  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S: Serializer, T: Serialize>(mutex: &Mutex<T>, serializer: S) -> Result<S::Ok, S::Error> {
    mutex
      .lock()
      .map_err(|_| serde::ser::Error::custom("poisoned mutex"))?
      .serialize(serializer)
  }

  pub fn deserialize<'de, D: Deserializer<'de>, T: Deserialize<'de>>(deserializer: D) -> Result<Mutex<T>, D::Error> {
    Ok(Mutex::new(T::deserialize(deserializer)?))
  }
}
