//! Manifest validation.
//!
//! Catches malformed manifests before any remote call is issued.

use super::types::{
    AccountManifest, ConfigError, GroupManifest, RoomManifest, SpaceManifest, StateGoal,
};

const VISIBILITIES: [&str; 2] = ["public", "private"];
const PRESETS: [&str; 3] = ["private_chat", "trusted_private_chat", "public_chat"];

fn check_visibility(visibility: Option<&String>) -> Result<(), ConfigError> {
    if let Some(v) = visibility {
        if !VISIBILITIES.contains(&v.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "visibility must be one of {VISIBILITIES:?}, got `{v}`"
            )));
        }
    }
    Ok(())
}

pub fn validate_room(manifest: &RoomManifest) -> Result<(), ConfigError> {
    if manifest.alias.trim().is_empty() {
        return Err(ConfigError::Invalid("room `alias` must not be empty".into()));
    }
    check_visibility(manifest.visibility.as_ref())?;
    if let Some(preset) = &manifest.preset {
        if !PRESETS.contains(&preset.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "preset must be one of {PRESETS:?}, got `{preset}`"
            )));
        }
    }
    if let Some(members) = &manifest.members {
        for (login, level) in members {
            if !(0..=100).contains(level) {
                return Err(ConfigError::Invalid(format!(
                    "member `{login}` has power level {level}, expected 0..=100"
                )));
            }
        }
    }
    if manifest.state == StateGoal::Deactivated {
        return Err(ConfigError::Invalid(
            "rooms do not support state = \"deactivated\"".into(),
        ));
    }
    Ok(())
}

pub fn validate_group(manifest: &GroupManifest) -> Result<(), ConfigError> {
    if manifest.localpart.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "group `localpart` must not be empty".into(),
        ));
    }
    check_visibility(manifest.visibility.as_ref())?;
    match manifest.state {
        StateGoal::Present | StateGoal::Absent => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "groups support state = \"present\" or \"absent\", got {other:?}"
        ))),
    }
}

pub fn validate_space(manifest: &SpaceManifest) -> Result<(), ConfigError> {
    if manifest.localpart.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "space `localpart` must not be empty".into(),
        ));
    }
    check_visibility(manifest.visibility.as_ref())?;
    match manifest.state {
        StateGoal::Present | StateGoal::Absent => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "spaces support state = \"present\" or \"absent\", got {other:?}"
        ))),
    }
}

pub fn validate_account(manifest: &AccountManifest) -> Result<(), ConfigError> {
    if manifest.login.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "account `login` must not be empty".into(),
        ));
    }
    if manifest.state == StateGoal::Archived {
        return Err(ConfigError::Invalid(
            "accounts do not support state = \"archived\"".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_alias_rejected() {
        let manifest = RoomManifest {
            alias: " ".into(),
            ..Default::default()
        };
        assert!(validate_room(&manifest).is_err());
    }

    #[test]
    fn bad_visibility_rejected() {
        let manifest = RoomManifest {
            alias: "ops".into(),
            visibility: Some("hidden".into()),
            ..Default::default()
        };
        assert!(validate_room(&manifest).is_err());
    }

    #[test]
    fn out_of_range_level_rejected() {
        let manifest = RoomManifest {
            alias: "ops".into(),
            members: Some([("alice".to_string(), 250)].into()),
            ..Default::default()
        };
        assert!(validate_room(&manifest).is_err());
    }

    #[test]
    fn archived_account_rejected() {
        let manifest = AccountManifest {
            login: "bot".into(),
            state: StateGoal::Archived,
            ..Default::default()
        };
        assert!(validate_account(&manifest).is_err());
    }

    #[test]
    fn valid_room_passes() {
        let manifest = RoomManifest {
            alias: "ops".into(),
            visibility: Some("private".into()),
            preset: Some("trusted_private_chat".into()),
            members: Some([("alice".to_string(), 100)].into()),
            ..Default::default()
        };
        assert!(validate_room(&manifest).is_ok());
    }
}
