use std::rc::Rc;
use tracing::{info, warn};

use super::{StoreError, StoreResult};
use crate::config::{Config, ConfigError, KNOWN_LANGUAGES, KNOWN_THEMES};
use crate::gateway::Gateway;
use crate::models::ProfilePatch;

/// Theme, language and currency. Changes apply locally at once; while a
/// user is signed in they are also saved to the profile row.
pub struct Preferences {
    gateway: Rc<dyn Gateway>,
    user_id: Option<String>,
    theme: String,
    language: String,
    currency: Option<String>,
}

impl Preferences {
    pub fn new(gateway: Rc<dyn Gateway>, config: &Config) -> Self {
        Self {
            gateway,
            user_id: None,
            theme: config.theme.clone(),
            language: config.language.clone(),
            currency: config.currency.clone(),
        }
    }

    /// Adopt the saved profile, or save the local choices as the first
    /// profile. A saved profile without a currency takes the local one.
    pub fn attach(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());

        let profile = match self.gateway.get_profile(user_id) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Could not load profile, keeping local preferences: {}", e);
                return;
            }
        };

        let patch = match profile {
            Some(profile) => {
                if KNOWN_THEMES.contains(&profile.theme.as_str()) {
                    self.theme = profile.theme;
                }
                if KNOWN_LANGUAGES.contains(&profile.language.as_str()) {
                    self.language = profile.language;
                }
                match profile.currency {
                    Some(currency) => {
                        self.currency = Some(currency);
                        None
                    }
                    None => self.currency.clone().map(|currency| ProfilePatch {
                        currency: Some(Some(currency)),
                        ..ProfilePatch::default()
                    }),
                }
            }
            None => Some(ProfilePatch {
                theme: Some(self.theme.clone()),
                language: Some(self.language.clone()),
                currency: self.currency.clone().map(Some),
            }),
        };

        if let Some(patch) = patch {
            match self.gateway.upsert_profile(&patch, user_id) {
                Ok(_) => info!("Saved local preferences to profile"),
                Err(e) => warn!("Could not save preferences to profile: {}", e),
            }
        }
    }

    pub fn detach(&mut self) {
        self.user_id = None;
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn set_theme(&mut self, theme: &str) -> StoreResult<()> {
        if !KNOWN_THEMES.contains(&theme) {
            return Err(StoreError::Validation(format!("unknown theme '{}'", theme)));
        }
        self.theme = theme.to_string();
        self.save(ProfilePatch {
            theme: Some(theme.to_string()),
            ..ProfilePatch::default()
        })
    }

    pub fn set_language(&mut self, language: &str) -> StoreResult<()> {
        if !KNOWN_LANGUAGES.contains(&language) {
            return Err(StoreError::Validation(format!("unknown language '{}'", language)));
        }
        self.language = language.to_string();
        self.save(ProfilePatch {
            language: Some(language.to_string()),
            ..ProfilePatch::default()
        })
    }

    /// Record a currency chosen elsewhere (the money manager saves it).
    pub fn note_currency(&mut self, currency: &str) {
        self.currency = Some(currency.to_string());
    }

    /// Copy the current choices into `config` for the next start.
    pub fn write_to(&self, config: &mut Config) -> Result<(), ConfigError> {
        config.set_theme(&self.theme)?;
        config.set_language(&self.language)?;
        config.set_currency(self.currency.clone());
        Ok(())
    }

    fn save(&self, patch: ProfilePatch) -> StoreResult<()> {
        if let Some(user_id) = &self.user_id {
            self.gateway.upsert_profile(&patch, user_id)?;
        }
        Ok(())
    }
}
