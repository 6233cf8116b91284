//! Device and OS classification from the User-Agent string.

use serde::Serialize;

/// Classified device type and OS family for a connection event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceClass {
    pub device_type: &'static str,
    pub os_family: &'static str,
}

impl DeviceClass {
    fn new(device_type: &'static str, os_family: &'static str) -> Self {
        Self {
            device_type,
            os_family,
        }
    }
}

/// Classify a User-Agent string into `{device_type, os_family}`.
///
/// First matching rule wins. Android checks must run before the generic
/// desktop checks, and "Mac OS X" is matched as a whole phrase so iOS
/// UAs (which also contain "like Mac OS X") are classified first.
pub fn classify_user_agent(user_agent: Option<&str>) -> DeviceClass {
    let ua = match user_agent {
        Some(ua) if !ua.is_empty() => ua,
        _ => return DeviceClass::new("unknown", "unknown"),
    };

    if ua.contains("iPhone") || ua.contains("iPod") {
        DeviceClass::new("mobile", "ios")
    } else if ua.contains("iPad") {
        DeviceClass::new("tablet", "ios")
    } else if ua.contains("Android") && ua.contains("Mobile") {
        DeviceClass::new("mobile", "android")
    } else if ua.contains("Android") {
        DeviceClass::new("tablet", "android")
    } else if ua.contains("Windows") {
        DeviceClass::new("desktop", "windows")
    } else if ua.contains("Mac OS X") {
        DeviceClass::new("desktop", "macos")
    } else if ua.contains("Linux") {
        DeviceClass::new("desktop", "linux")
    } else {
        DeviceClass::new("unknown", "unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_iphone() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("mobile", "ios")
        );
    }

    #[test]
    fn test_classify_ipad() {
        let ua = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("tablet", "ios")
        );
    }

    #[test]
    fn test_classify_android_mobile() {
        let ua = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("mobile", "android")
        );
    }

    #[test]
    fn test_classify_android_tablet() {
        let ua = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Safari/537.36";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("tablet", "android")
        );
    }

    #[test]
    fn test_classify_windows_desktop() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("desktop", "windows")
        );
    }

    #[test]
    fn test_classify_macos_desktop() {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("desktop", "macos")
        );
    }

    #[test]
    fn test_classify_linux_desktop() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        assert_eq!(
            classify_user_agent(Some(ua)),
            DeviceClass::new("desktop", "linux")
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            classify_user_agent(Some("curl/8.4.0")),
            DeviceClass::new("unknown", "unknown")
        );
        assert_eq!(
            classify_user_agent(None),
            DeviceClass::new("unknown", "unknown")
        );
        assert_eq!(
            classify_user_agent(Some("")),
            DeviceClass::new("unknown", "unknown")
        );
    }
}
