//! Common wait predicates

use crate::source::{ChangedProperties, ObjectAdded, PropertyValue};

/// Accept a change set in which boolean property `name` became `expected`
///
/// Covers the usual remote state transitions: `Connected`, `Discovering`,
/// `ServicesResolved`, `Notifying`.
pub fn bool_property(
    name: impl Into<String>,
    expected: bool,
) -> impl Fn(&ChangedProperties) -> bool + Send + Sync + 'static {
    let name = name.into();
    move |changed: &ChangedProperties| changed.get_bool(&name) == Some(expected)
}

/// Accept a change set in which property `name` became exactly `value`
pub fn property_equals(
    name: impl Into<String>,
    value: PropertyValue,
) -> impl Fn(&ChangedProperties) -> bool + Send + Sync + 'static {
    let name = name.into();
    move |changed: &ChangedProperties| changed.get(&name) == Some(&value)
}

/// Accept a change set that mentions property `name` at all
pub fn property_changed(
    name: impl Into<String>,
) -> impl Fn(&ChangedProperties) -> bool + Send + Sync + 'static {
    let name = name.into();
    move |changed: &ChangedProperties| changed.contains(&name)
}

/// Accept a newly added object implementing `interface`
pub fn interface_added(
    interface: impl Into<String>,
) -> impl Fn(&ObjectAdded) -> bool + Send + Sync + 'static {
    let interface = interface.into();
    move |added: &ObjectAdded| added.implements(&interface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_property() {
        let connected = bool_property("Connected", true);
        assert!(connected(&ChangedProperties::new().with("Connected", true)));
        assert!(!connected(&ChangedProperties::new().with("Connected", false)));
        assert!(!connected(&ChangedProperties::new().with("RSSI", -50i64)));

        let stopped = bool_property("Discovering", false);
        assert!(stopped(&ChangedProperties::new().with("Discovering", false)));
    }

    #[test]
    fn test_property_equals_and_changed() {
        let named = property_equals("Name", PropertyValue::from("sensor-sim"));
        assert!(named(&ChangedProperties::new().with("Name", "sensor-sim")));
        assert!(!named(&ChangedProperties::new().with("Name", "sensor")));

        let any_value = property_changed("Value");
        assert!(any_value(&ChangedProperties::new().with("Value", vec![1u8, 2])));
        assert!(!any_value(&ChangedProperties::new()));
    }

    #[test]
    fn test_interface_added() {
        let device = interface_added("org.bluez.Device1");
        assert!(device(&ObjectAdded::new("/dev_1", &["org.bluez.Device1"])));
        assert!(!device(&ObjectAdded::new("/svc_1", &["org.bluez.GattService1"])));
    }
}
