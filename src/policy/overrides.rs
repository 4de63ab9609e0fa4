use std::net::IpAddr;

use tracing::{info, warn};

use super::{
    PolicySource, PreferenceOption, ALLOW_INCOMING_CONNECTIONS, EXIT_NODE_IP, LOGIN_URL,
    UNATTENDED_MODE,
};
use crate::prefs::NormalizedPrefs;

/// Control URL that old installers wrote into the policy slot themselves.
pub const LEGACY_INSTALLER_CONTROL_URL: &str = "https://login.tailscale.com";

/// Adjusts migrated prefs for centrally managed platforms.
///
/// Must not touch stored state; the only side effect allowed is querying
/// the policy engine.
pub trait PolicyOverride: Send + Sync {
    fn apply(&self, prefs: NormalizedPrefs) -> NormalizedPrefs;
}

pub struct ManagedPolicyOverride<P> {
    source: P,
    default_control_url: String,
}

impl<P: PolicySource> ManagedPolicyOverride<P> {
    pub fn new(source: P, default_control_url: impl Into<String>) -> Self {
        Self {
            source,
            default_control_url: default_control_url.into(),
        }
    }

    fn policy_string(&self, name: &str) -> Option<String> {
        match self.source.string(name) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(err) => {
                warn!(
                    target: "legacy_prefs",
                    event = "legacy_prefs_policy_read_failed",
                    policy = name,
                    code = err.code()
                );
                None
            }
        }
    }

    fn resolve_exit_node_ip(&self, loaded: Option<IpAddr>) -> Option<IpAddr> {
        let Some(raw) = self.policy_string(EXIT_NODE_IP) else {
            return loaded;
        };
        match raw.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!(
                    target: "legacy_prefs",
                    event = "legacy_prefs_policy_invalid",
                    policy = EXIT_NODE_IP
                );
                loaded
            }
        }
    }
}

impl<P: PolicySource> PolicyOverride for ManagedPolicyOverride<P> {
    fn apply(&self, mut prefs: NormalizedPrefs) -> NormalizedPrefs {
        let before = (prefs.shields_up, prefs.force_daemon);

        let admin_url = self.policy_string(LOGIN_URL).unwrap_or_default();
        prefs.control_url =
            select_control_url(&admin_url, &prefs.control_url, &self.default_control_url);
        prefs.exit_node_ip = self.resolve_exit_node_ip(prefs.exit_node_ip);

        // Both flags only move toward the restrictive state.
        let allow_incoming = self.source.preference_option(ALLOW_INCOMING_CONNECTIONS);
        prefs.shields_up = prefs.shields_up || allow_incoming == PreferenceOption::Never;

        let unattended = self.source.preference_option(UNATTENDED_MODE);
        prefs.force_daemon = prefs.force_daemon || unattended == PreferenceOption::Always;

        info!(
            target: "legacy_prefs",
            event = "legacy_prefs_policy_applied",
            allow_incoming_forced = allow_incoming.is_forced(),
            unattended_forced = unattended.is_forced(),
            shields_up_changed = before.0 != prefs.shields_up,
            force_daemon_changed = before.1 != prefs.force_daemon
        );
        prefs
    }
}

/// Choose between the administrator's control URL and the one on disk.
///
/// An explicit policy URL wins unless it is the value old installers wrote
/// on their own; that one only fills an empty disk value. Otherwise the disk
/// value is kept, and `default_url` fills in when it is empty.
pub fn select_control_url(policy_url: &str, disk_url: &str, default_url: &str) -> String {
    let installer_default = policy_url == LEGACY_INSTALLER_CONTROL_URL;
    if !policy_url.is_empty() && (!installer_default || disk_url.is_empty()) {
        policy_url.to_string()
    } else if !disk_url.is_empty() {
        disk_url.to_string()
    } else {
        default_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTROL_URL;
    use crate::policy::MemoryPolicySource;

    const CUSTOM: &str = "https://ctl.example.net";

    #[test]
    fn control_url_selection_table() {
        let cases = [
            // (policy, disk, expected)
            ("", "", DEFAULT_CONTROL_URL),
            ("", CUSTOM, CUSTOM),
            ("https://admin.corp", CUSTOM, "https://admin.corp"),
            ("https://admin.corp", "", "https://admin.corp"),
            (LEGACY_INSTALLER_CONTROL_URL, "", LEGACY_INSTALLER_CONTROL_URL),
            (LEGACY_INSTALLER_CONTROL_URL, CUSTOM, CUSTOM),
            (LEGACY_INSTALLER_CONTROL_URL, DEFAULT_CONTROL_URL, DEFAULT_CONTROL_URL),
            (
                LEGACY_INSTALLER_CONTROL_URL,
                LEGACY_INSTALLER_CONTROL_URL,
                LEGACY_INSTALLER_CONTROL_URL,
            ),
        ];
        for (policy, disk, expected) in cases {
            assert_eq!(
                select_control_url(policy, disk, DEFAULT_CONTROL_URL),
                expected,
                "policy={policy:?} disk={disk:?}"
            );
        }
    }

    fn managed(source: MemoryPolicySource) -> ManagedPolicyOverride<MemoryPolicySource> {
        ManagedPolicyOverride::new(source, DEFAULT_CONTROL_URL)
    }

    #[test]
    fn disallowing_incoming_forces_shields_up() {
        let policy = managed(MemoryPolicySource::new().with(ALLOW_INCOMING_CONNECTIONS, "never"));
        let prefs = NormalizedPrefs {
            shields_up: false,
            ..NormalizedPrefs::default()
        };
        assert!(policy.apply(prefs).shields_up);
    }

    #[test]
    fn unset_policy_preserves_loaded_values() {
        let policy = managed(MemoryPolicySource::new());
        let prefs = NormalizedPrefs {
            control_url: CUSTOM.into(),
            exit_node_ip: Some("100.64.0.1".parse().unwrap()),
            shields_up: true,
            force_daemon: true,
            ..NormalizedPrefs::default()
        };
        assert_eq!(policy.apply(prefs.clone()), prefs);
    }

    #[test]
    fn unattended_mode_forces_background_service() {
        let policy = managed(MemoryPolicySource::new().with(UNATTENDED_MODE, "always"));
        assert!(policy.apply(NormalizedPrefs::default()).force_daemon);
    }

    #[test]
    fn unattended_never_keeps_loaded_background_service() {
        let policy = managed(MemoryPolicySource::new().with(UNATTENDED_MODE, "never"));
        let prefs = NormalizedPrefs {
            force_daemon: true,
            ..NormalizedPrefs::default()
        };
        assert!(policy.apply(prefs).force_daemon);
        assert!(!policy.apply(NormalizedPrefs::default()).force_daemon);
    }

    #[test]
    fn allowing_incoming_never_lowers_shields() {
        let policy = managed(MemoryPolicySource::new().with(ALLOW_INCOMING_CONNECTIONS, "always"));
        let prefs = NormalizedPrefs {
            shields_up: true,
            ..NormalizedPrefs::default()
        };
        assert!(policy.apply(prefs).shields_up);
        assert!(!policy.apply(NormalizedPrefs::default()).shields_up);
    }

    #[test]
    fn exit_node_policy_overrides_when_valid() {
        let policy = managed(MemoryPolicySource::new().with(EXIT_NODE_IP, "100.100.1.1"));
        let applied = policy.apply(NormalizedPrefs::default());
        assert_eq!(applied.exit_node_ip, Some("100.100.1.1".parse().unwrap()));

        let policy = managed(MemoryPolicySource::new().with(EXIT_NODE_IP, "exit-please"));
        let loaded = NormalizedPrefs {
            exit_node_ip: Some("fd7a:115c:a1e0::1".parse().unwrap()),
            ..NormalizedPrefs::default()
        };
        assert_eq!(policy.apply(loaded.clone()).exit_node_ip, loaded.exit_node_ip);
    }

    #[test]
    fn passthrough_fields_survive_policy() {
        let mut prefs = NormalizedPrefs::default();
        prefs
            .passthrough
            .insert("Hostname".into(), serde_json::json!("desk-01"));
        let policy = managed(
            MemoryPolicySource::new()
                .with(ALLOW_INCOMING_CONNECTIONS, "never")
                .with(LOGIN_URL, "https://admin.corp"),
        );
        let applied = policy.apply(prefs);
        assert_eq!(applied.control_url, "https://admin.corp");
        assert_eq!(
            applied.passthrough.get("Hostname"),
            Some(&serde_json::json!("desk-01"))
        );
    }
}
