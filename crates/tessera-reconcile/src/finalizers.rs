//! Finalizer removal with optimistic concurrency.
//!
//! Read the object, drop the given finalizers, write the shortened list
//! against the version that was read. A conflict re-reads and retries.

use async_trait::async_trait;
use tracing::debug;

use tessera_state::MAX_CONFLICT_RETRIES;

use crate::error::{ResourceError, ResourceResult};

/// Finalizers of one object together with the version they were read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizerState {
    pub finalizers: Vec<String>,
    pub resource_version: Option<String>,
}

/// Access to the finalizer list of one kind of object.
#[async_trait]
pub trait FinalizerClient: Send + Sync {
    async fn get_finalizers(&self, name: &str) -> ResourceResult<FinalizerState>;

    /// Replace the finalizer list; [`ResourceError::Conflict`] when the
    /// object moved past `resource_version`.
    async fn set_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<&str>,
    ) -> ResourceResult<()>;
}

/// Remove `finalizers` from object `name`. Returns how many were removed.
///
/// Nothing to remove means no write at all.
pub async fn remove_finalizers<C>(
    client: &C,
    name: &str,
    finalizers: &[String],
    ignore_not_found: bool,
) -> ResourceResult<usize>
where
    C: FinalizerClient + ?Sized,
{
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let current = match client.get_finalizers(name).await {
            Ok(current) => current,
            Err(ResourceError::NotFound(_)) if ignore_not_found => return Ok(0),
            Err(e) => return Err(e),
        };

        let before = current.finalizers.len();
        let kept: Vec<String> = current
            .finalizers
            .into_iter()
            .filter(|f| !finalizers.contains(f))
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        match client
            .set_finalizers(name, kept, current.resource_version.as_deref())
            .await
        {
            Ok(()) => return Ok(removed),
            Err(ResourceError::Conflict(_)) => {
                debug!(object = %name, attempt, "finalizer update conflict, retrying");
            }
            Err(ResourceError::NotFound(_)) if ignore_not_found => return Ok(0),
            Err(e) => return Err(e),
        }
    }
    Err(ResourceError::RetriesExhausted {
        name: name.to_string(),
        attempts: MAX_CONFLICT_RETRIES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Fake {
        object: Mutex<Option<(Vec<String>, u64)>>,
        conflicts: Mutex<u32>,
        sets: Mutex<u32>,
    }

    impl Fake {
        fn with(finalizers: &[&str]) -> Self {
            let fake = Self::default();
            *fake.object.lock().unwrap() =
                Some((finalizers.iter().map(|f| f.to_string()).collect(), 1));
            fake
        }

        fn finalizers(&self) -> Vec<String> {
            self.object.lock().unwrap().as_ref().unwrap().0.clone()
        }

        fn sets(&self) -> u32 {
            *self.sets.lock().unwrap()
        }
    }

    #[async_trait]
    impl FinalizerClient for Fake {
        async fn get_finalizers(&self, name: &str) -> ResourceResult<FinalizerState> {
            let object = self.object.lock().unwrap();
            let (finalizers, version) = object
                .as_ref()
                .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
            Ok(FinalizerState {
                finalizers: finalizers.clone(),
                resource_version: Some(version.to_string()),
            })
        }

        async fn set_finalizers(
            &self,
            name: &str,
            finalizers: Vec<String>,
            resource_version: Option<&str>,
        ) -> ResourceResult<()> {
            *self.sets.lock().unwrap() += 1;
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(ResourceError::Conflict(name.to_string()));
            }
            let mut object = self.object.lock().unwrap();
            let (current, version) = object
                .as_mut()
                .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
            if resource_version != Some(version.to_string().as_str()) {
                return Err(ResourceError::Conflict(name.to_string()));
            }
            *current = finalizers;
            *version += 1;
            Ok(())
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn removes_only_named_finalizers() {
        let fake = Fake::with(&["a", "b", "c"]);
        let removed = remove_finalizers(&fake, "pod", &names(&["b", "x"]), false)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(fake.finalizers(), names(&["a", "c"]));
    }

    #[tokio::test]
    async fn nothing_to_remove_skips_update() {
        let fake = Fake::with(&["a"]);
        for _ in 0..2 {
            let removed = remove_finalizers(&fake, "pod", &names(&["b"]), false)
                .await
                .unwrap();
            assert_eq!(removed, 0);
        }
        assert_eq!(fake.sets(), 0);
    }

    #[tokio::test]
    async fn second_removal_is_a_noop() {
        let fake = Fake::with(&["a", "b"]);
        remove_finalizers(&fake, "pod", &names(&["a"]), false).await.unwrap();
        remove_finalizers(&fake, "pod", &names(&["a"]), false).await.unwrap();
        assert_eq!(fake.sets(), 1);
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let fake = Fake::with(&["a", "b"]);
        *fake.conflicts.lock().unwrap() = 3;
        let removed = remove_finalizers(&fake, "pod", &names(&["a"]), false)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(fake.sets(), 4);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let fake = Fake::with(&["a"]);
        *fake.conflicts.lock().unwrap() = u32::MAX;
        let err = remove_finalizers(&fake, "pod", &names(&["a"]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::RetriesExhausted { attempts: 50, .. }));
        assert_eq!(fake.sets(), MAX_CONFLICT_RETRIES);
    }

    #[tokio::test]
    async fn not_found_is_optional() {
        let fake = Fake::default();
        assert_eq!(
            remove_finalizers(&fake, "pod", &names(&["a"]), true).await.unwrap(),
            0
        );
        assert!(
            remove_finalizers(&fake, "pod", &names(&["a"]), false)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
