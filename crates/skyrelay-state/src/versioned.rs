use skyrelay_types::BatchVersion;

/// A value tagged with the batch version at which it last changed.
///
/// Fields only live inside records owned by the store, so writes and clones
/// happen under the store lock and a reader can never see a version ahead of
/// its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionedField<T> {
    value: T,
    version: BatchVersion,
}

impl<T: PartialEq> VersionedField<T> {
    pub fn new(value: T, version: BatchVersion) -> Self {
        VersionedField { value, version }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> BatchVersion {
        self.version
    }

    /// Assign `value`, advancing the version only when the value differs.
    /// Returns the field's version after the assignment.
    pub fn update(&mut self, value: T, version: BatchVersion) -> BatchVersion {
        if self.value != value {
            self.value = value;
            self.version = self.version.max(version);
        }
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_absent_at_version_zero() {
        let f: VersionedField<Option<f64>> = VersionedField::default();
        assert!(f.value().is_none());
        assert_eq!(f.version(), 0);
    }

    #[test]
    fn update_bumps_version_on_change() {
        let mut f = VersionedField::<Option<i32>>::default();
        assert_eq!(f.update(Some(1), 3), 3);
        assert_eq!(*f.value(), Some(1));
        assert_eq!(f.update(Some(2), 4), 4);
    }

    #[test]
    fn update_with_equal_value_keeps_version() {
        let mut f = VersionedField::new(Some("BAW1".to_string()), 2);
        assert_eq!(f.update(Some("BAW1".to_string()), 9), 2);
        assert_eq!(f.version(), 2);
    }

    #[test]
    fn absent_is_a_value() {
        let mut f = VersionedField::new(Some(true), 1);
        assert_eq!(f.update(None, 2), 2);
        assert!(f.value().is_none());
        // absent -> absent is a no-op
        assert_eq!(f.update(None, 3), 2);
    }

    #[test]
    fn version_never_goes_backwards() {
        let mut f = VersionedField::new(Some(1), 10);
        assert_eq!(f.update(Some(2), 5), 10);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = VersionedField::new(Some(1.5f32), 1);
        let b = a.clone();
        a.update(Some(2.5), 2);
        assert_eq!(*b.value(), Some(1.5));
        assert_eq!(b.version(), 1);
    }
}
