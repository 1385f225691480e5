//! Editor commands.
//!
//! Every mutation of the site state is a [`Command`]. Commands are
//! serializable so the web editor, the CLI and tests drive the store the
//! same way, and [`Command::apply`] is a pure reducer: it never touches
//! storage and leaves its input unchanged.
//!
//! ```ignore
//! use sitesync_core::command::Command;
//!
//! let cmd = Command::RemoveApartment { id: "3".to_string() };
//! let next = cmd.apply(&state)?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SiteSyncError};
use crate::model::{
    About, Apartment, Contact, Hero, Promotion, Review, Seo, SiteContent, SiteState,
    SocialLinks, UserSession,
};

/// All mutations of the site state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Command {
    // === Sections ===
    /// Replace the landing banner.
    SetHero(Hero),

    /// Replace the about-us block.
    SetAbout(About),

    /// Replace the contact details.
    SetContact(Contact),

    /// Replace the search engine metadata.
    SetSeo(Seo),

    /// Replace the social links.
    SetSocial(SocialLinks),

    // === Apartments ===
    /// Add a new apartment. Its id must be unused.
    AddApartment(Apartment),

    /// Update fields of an existing apartment.
    UpdateApartment {
        /// Apartment to update.
        id: String,
        /// camelCase fields to overwrite. `id` is ignored.
        patch: JsonValue,
    },

    /// Remove an apartment.
    RemoveApartment {
        /// Apartment to remove.
        id: String,
    },

    // === Reviews ===
    /// Add a review. An empty id gets a generated one.
    AddReview(Review),

    /// Remove a review.
    RemoveReview {
        /// Review to remove.
        id: String,
    },

    // === Promotions ===
    /// Insert a promotion, or replace the one with the same id.
    UpsertPromotion(Promotion),

    /// Remove a promotion.
    RemovePromotion {
        /// Promotion to remove.
        id: String,
    },

    // === Whole document ===
    /// Replace all content, e.g. after loading it from the backend.
    ReplaceContent(Box<SiteContent>),

    /// Reset all content to the compiled default.
    ResetContent,

    /// Replace the editor session.
    SetSession(UserSession),
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetHero(_) => "SetHero",
            Self::SetAbout(_) => "SetAbout",
            Self::SetContact(_) => "SetContact",
            Self::SetSeo(_) => "SetSeo",
            Self::SetSocial(_) => "SetSocial",
            Self::AddApartment(_) => "AddApartment",
            Self::UpdateApartment { .. } => "UpdateApartment",
            Self::RemoveApartment { .. } => "RemoveApartment",
            Self::AddReview(_) => "AddReview",
            Self::RemoveReview { .. } => "RemoveReview",
            Self::UpsertPromotion(_) => "UpsertPromotion",
            Self::RemovePromotion { .. } => "RemovePromotion",
            Self::ReplaceContent(_) => "ReplaceContent",
            Self::ResetContent => "ResetContent",
            Self::SetSession(_) => "SetSession",
        }
    }

    /// Compute the state after this command.
    ///
    /// Errors leave `state` untouched.
    pub fn apply(&self, state: &SiteState) -> Result<SiteState> {
        let mut next = state.clone();
        let content = &mut next.content;

        match self {
            Self::SetHero(hero) => content.hero = hero.clone(),
            Self::SetAbout(about) => content.about = about.clone(),
            Self::SetContact(contact) => content.contact = contact.clone(),
            Self::SetSeo(seo) => content.seo = seo.clone(),
            Self::SetSocial(social) => content.social = social.clone(),

            Self::AddApartment(apartment) => {
                if content.apartment(&apartment.id).is_some() {
                    return Err(SiteSyncError::DuplicateApartment(apartment.id.clone()));
                }
                content.apartments.push(apartment.clone());
            }
            Self::UpdateApartment { id, patch } => {
                let slot = content
                    .apartments
                    .iter_mut()
                    .find(|a| &a.id == id)
                    .ok_or_else(|| SiteSyncError::ApartmentNotFound(id.clone()))?;
                *slot = patched(slot, patch)?;
            }
            Self::RemoveApartment { id } => {
                let before = content.apartments.len();
                content.apartments.retain(|a| &a.id != id);
                if content.apartments.len() == before {
                    return Err(SiteSyncError::ApartmentNotFound(id.clone()));
                }
            }

            Self::AddReview(review) => {
                let mut review = review.clone();
                if review.id.is_empty() {
                    review.id = chrono::Utc::now().timestamp_millis().to_string();
                }
                content.reviews.push(review);
            }
            Self::RemoveReview { id } => {
                let before = content.reviews.len();
                content.reviews.retain(|r| &r.id != id);
                if content.reviews.len() == before {
                    return Err(SiteSyncError::ReviewNotFound(id.clone()));
                }
            }

            Self::UpsertPromotion(promotion) => {
                match content.promotions.iter_mut().find(|p| p.id == promotion.id) {
                    Some(existing) => *existing = promotion.clone(),
                    None => content.promotions.push(promotion.clone()),
                }
            }
            Self::RemovePromotion { id } => {
                let before = content.promotions.len();
                content.promotions.retain(|p| &p.id != id);
                if content.promotions.len() == before {
                    return Err(SiteSyncError::PromotionNotFound(id.clone()));
                }
            }

            Self::ReplaceContent(replacement) => *content = (**replacement).clone(),
            Self::ResetContent => *content = SiteContent::default(),
            Self::SetSession(user) => next.user = user.clone(),
        }

        Ok(next)
    }
}

/// Overwrite an apartment's fields with those in `patch`.
fn patched(apartment: &Apartment, patch: &JsonValue) -> Result<Apartment> {
    let mut value = serde_json::to_value(apartment)?;
    if let (Some(target), Some(fields)) = (value.as_object_mut(), patch.as_object()) {
        for (key, field) in fields {
            if key != "id" {
                target.insert(key.clone(), field.clone());
            }
        }
    }
    Ok(serde_json::from_value(value)?)
}
