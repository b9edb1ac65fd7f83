//! Local → upstream identifier resolution.
//!
//! A student's upstream id is looked up in order:
//!
//! 1. the local student record,
//! 2. the internal name → id table,
//! 3. the upstream student directory, matched by name.
//!
//! The directory is fetched at most once per [`Resolver`], i.e. once per run.

use std::collections::HashMap;

use tally_core::{
  directory::{Student, name_key},
  store::IngestStore,
};
use tally_upstream::{Pacer, TutoringApi};

use crate::{Error, Result};

pub struct Resolver<'a, S, A> {
  store:     &'a S,
  api:       &'a A,
  /// `name_key` → upstream id; `None` until first needed.
  directory: Option<HashMap<String, String>>,
}

impl<'a, S, A> Resolver<'a, S, A>
where
  S: IngestStore,
  A: TutoringApi,
{
  pub fn new(store: &'a S, api: &'a A) -> Self {
    Self { store, api, directory: None }
  }

  /// Resolve through all three sources.
  pub async fn student(
    &mut self,
    student: &Student,
    pacer: &mut Pacer,
  ) -> Result<Option<String>> {
    if let Some(id) = student.upstream_id.as_deref().filter(|id| !id.is_empty()) {
      return Ok(Some(id.to_owned()));
    }
    if let Some(id) = self.local_name(&student.name).await? {
      return Ok(Some(id));
    }
    self.directory_name(&student.name, pacer).await
  }

  /// The internal name table only.
  pub async fn local_name(&self, name: &str) -> Result<Option<String>> {
    self
      .store
      .upstream_id_for_name(name_key(name))
      .await
      .map_err(Error::store)
  }

  /// The upstream directory only, fetching it on first use. A failed fetch
  /// is returned once and not retried; later lookups in the same run miss.
  pub async fn directory_name(
    &mut self,
    name: &str,
    pacer: &mut Pacer,
  ) -> Result<Option<String>> {
    if self.directory.is_none() {
      match pacer.run(self.api.list_students()).await {
        Ok(students) => {
          tracing::debug!(count = students.len(), "fetched upstream student directory");
          let by_name = students
            .into_iter()
            .map(|s| (name_key(&s.name), s.student_id))
            .collect();
          self.directory = Some(by_name);
        }
        Err(e) => {
          self.directory = Some(HashMap::new());
          return Err(e.into());
        }
      }
    }
    Ok(
      self
        .directory
        .as_ref()
        .and_then(|d| d.get(&name_key(name)))
        .cloned(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeApi, store_with};
  use tally_core::directory::{Directory, NameMapping};
  use uuid::Uuid;

  fn student(name: &str, upstream_id: Option<&str>) -> Student {
    Student {
      student_id:  Uuid::new_v4(),
      name:        name.into(),
      class_id:    None,
      upstream_id: upstream_id.map(str::to_owned),
      active:      true,
    }
  }

  #[tokio::test]
  async fn sources_are_consulted_in_order() {
    let store = store_with(Directory {
      name_table: vec![NameMapping { name: "Kim  Ji".into(), upstream_id: "from-table".into() }],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default().with_student("from-dir", "Lee Su");
    let mut pacer = Pacer::from_millis(0);
    let mut resolver = Resolver::new(&store, &api);

    let own = resolver.student(&student("Kim Ji", Some("own")), &mut pacer).await.unwrap();
    assert_eq!(own.as_deref(), Some("own"));
    let table = resolver.student(&student("Kim Ji", None), &mut pacer).await.unwrap();
    assert_eq!(table.as_deref(), Some("from-table"));
    let dir = resolver.student(&student(" Lee Su ", None), &mut pacer).await.unwrap();
    assert_eq!(dir.as_deref(), Some("from-dir"));
    let none = resolver.student(&student("Nobody", None), &mut pacer).await.unwrap();
    assert!(none.is_none());

    assert_eq!(api.call_count("students"), 1);
  }

  #[tokio::test]
  async fn failed_directory_fetch_is_not_retried() {
    let store = store_with(Directory::default()).await;
    let api = FakeApi::default().failing("students");
    let mut pacer = Pacer::from_millis(0);
    let mut resolver = Resolver::new(&store, &api);

    assert!(resolver.directory_name("A", &mut pacer).await.is_err());
    assert!(resolver.directory_name("A", &mut pacer).await.unwrap().is_none());
    assert_eq!(api.call_count("students"), 1);
  }
}
