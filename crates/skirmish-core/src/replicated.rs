//! Replicated variables: values written by the authoritative side and
//! mirrored, read-only, by observers.

/// Which side of the replication link owns a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    /// The server; the only side allowed to write.
    Authoritative,
    /// A passive mirror that only accepts values from the server.
    Observer,
}

/// Rejected writes to a [`Replicated`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    /// A local write was attempted on an observer copy.
    #[error("only the authoritative side may write this value")]
    NotAuthoritative,

    /// A remote value was pushed into the authoritative copy.
    #[error("the authoritative copy does not accept remote values")]
    NotObserver,
}

/// A value with a single writer.
///
/// Authoritative writes mark the value dirty until the replication pass
/// collects it with [`Replicated::take_dirty`].
#[derive(Debug, Clone, PartialEq)]
pub struct Replicated<T> {
    value: T,
    authority: Authority,
    dirty: bool,
}

impl<T: Clone + PartialEq> Replicated<T> {
    /// Creates the authoritative copy. It starts dirty so observers receive
    /// the initial value.
    pub fn authoritative(value: T) -> Self {
        Self {
            value,
            authority: Authority::Authoritative,
            dirty: true,
        }
    }

    /// Creates an observer copy.
    pub fn observer(value: T) -> Self {
        Self {
            value,
            authority: Authority::Observer,
            dirty: false,
        }
    }

    /// Current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Side owning this copy.
    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Writes a new value. Returns `Ok(true)` if the value changed.
    pub fn set(&mut self, value: T) -> Result<bool, ReplicationError> {
        if self.authority != Authority::Authoritative {
            tracing::warn!("Rejected local write to an observer copy");
            return Err(ReplicationError::NotAuthoritative);
        }
        if self.value == value {
            return Ok(false);
        }
        self.value = value;
        self.dirty = true;
        Ok(true)
    }

    /// Accepts a value received from the authoritative side. Returns
    /// `Ok(true)` if the value changed.
    pub fn apply_remote(&mut self, value: T) -> Result<bool, ReplicationError> {
        if self.authority != Authority::Observer {
            tracing::warn!("Rejected remote value for the authoritative copy");
            return Err(ReplicationError::NotObserver);
        }
        if self.value == value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    /// Returns whether the value changed since the last call and clears the
    /// flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authoritative_write_marks_dirty() {
        let mut value = Replicated::authoritative(10);
        assert!(value.take_dirty(), "initial value must replicate");
        assert!(!value.take_dirty());

        assert_eq!(value.set(10), Ok(false));
        assert!(!value.take_dirty());

        assert_eq!(value.set(4), Ok(true));
        assert_eq!(*value.get(), 4);
        assert!(value.take_dirty());
    }

    #[test]
    fn test_observer_rejects_local_writes() {
        let mut value = Replicated::observer(1.0_f32);
        assert_eq!(value.set(2.0), Err(ReplicationError::NotAuthoritative));
        assert_eq!(value.apply_remote(2.0), Ok(true));
        assert_eq!(value.apply_remote(2.0), Ok(false));
        assert_eq!(*value.get(), 2.0);
        assert_eq!(value.authority(), Authority::Observer);
    }

    #[test]
    fn test_authoritative_rejects_remote_values() {
        let mut value = Replicated::authoritative("alive");
        assert_eq!(
            value.apply_remote("dead"),
            Err(ReplicationError::NotObserver)
        );
        assert_eq!(*value.get(), "alive");
    }
}
