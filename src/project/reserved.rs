//! Reserved analytics property names
//!
//! Properties the analytics service's own libraries attach to every
//! event. Custom-property collection subtracts these so the overflow
//! column carries only caller-defined properties.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Property names reserved by the analytics service
pub static KNOWN_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "event",
        "distinct_id",
        "ip",
        "mp_name_tag",
        "mp_note",
        "token",
        "time",
        "mp_country_code",
        "length",
        "campaign_id",
        "$email",
        "$phone",
        "$distinct_id",
        "$ios_devices",
        "$android_devices",
        "$first_name",
        "$last_name",
        "$name",
        "$city",
        "$region",
        "$country_code",
        "$timezone",
        "$unsubscribed",
        "$browser",
        "$browser_version",
        "$device",
        "$current_url",
        "$initial_referrer",
        "$initial_referring_domain",
        "$os",
        "$referrer",
        "$referring_domain",
        "$screen_height",
        "$screen_width",
        "$search_engine",
        "$mp_country_code",
        "$last_seen",
        "$app_release",
        "$app_version",
        "$carrier",
        "$ios_ifa",
        "$os_version",
        "$manufacturer",
        "$lib_version",
        "$model",
        "$wifi",
        "$ios_app_release",
        "$ios_app_version",
        "$ios_device_model",
        "$ios_lib_version",
        "$ios_version",
        "$bluetooth_enabled",
        "$bluetooth_version",
        "$brand",
        "$has_nfc",
        "$has_telephone",
        "$screen_dpi",
        "$google_play_services",
        "$android_app_version",
        "$android_app_version_code",
        "$android_lib_version",
        "$android_os",
        "$android_os_version",
        "$android_brand",
        "$android_model",
        "$android_manufacturer",
    ]
    .into_iter()
    .collect()
});

/// Whether a property name is reserved by the service
pub fn is_reserved(key: &str) -> bool {
    KNOWN_KEYS.contains(key)
}
