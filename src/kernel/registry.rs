//! Badge-gated tool registration.
//!
//! A tool can only be created with a [`RegistrationGrant`], which only the
//! badge gate mints. The scannable code is generated here, once.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::badge::RegistrationGrant;
use crate::codec::{AssetTag, CodeCodec};
use crate::ledger::{Availability, Tool, ToolStore};
use crate::types::{CategoryId, Error, Result, ToolId, UserId};

/// Registration form contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDraft {
    pub name: String,
    pub asset_tag: String,
    #[serde(default)]
    pub details: String,
    pub location: String,
    pub category: Option<CategoryId>,
    /// Reference returned by the image storage collaborator, if a photo was uploaded.
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl ToolDraft {
    /// Check required fields in form order and parse the asset tag.
    pub fn validate(&self) -> Result<(AssetTag, CategoryId)> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("tool name is required"));
        }
        if self.asset_tag.trim().is_empty() {
            return Err(Error::validation("asset tag is required"));
        }
        if self.location.trim().is_empty() {
            return Err(Error::validation("storage location is required"));
        }
        let category = self
            .category
            .clone()
            .ok_or_else(|| Error::validation("category is required"))?;
        let asset_tag = AssetTag::parse(self.asset_tag.trim())?;
        Ok((asset_tag, category))
    }
}

/// Creates catalog records for new tools.
#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn ToolStore>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn ToolStore>) -> Self {
        Self { store }
    }

    /// Register a tool as `Available` with a freshly encoded scannable code.
    pub async fn register(
        &self,
        grant: &RegistrationGrant,
        draft: ToolDraft,
        added_by: Option<UserId>,
    ) -> Result<Tool> {
        let (asset_tag, category_id) = draft.validate()?;
        let created_at = Utc::now();

        let tool = Tool {
            id: ToolId::new(),
            code: CodeCodec::encode_at(&asset_tag, created_at),
            asset_tag,
            name: draft.name.trim().to_string(),
            details: draft.details,
            location: draft.location.trim().to_string(),
            category_id,
            image_ref: draft.image_ref,
            availability: Availability::Available,
            created_at,
            added_by,
        };

        let tool = self.store.insert_tool(tool).await?;
        tracing::info!(
            tool_id = %tool.id,
            asset_tag = %tool.asset_tag,
            code = %tool.code,
            granted_at = %grant.granted_at(),
            "tool_registered"
        );
        Ok(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::{AcceptedBadges, BadgeGate};
    use crate::ledger::MemoryStore;
    use pretty_assertions::assert_eq;

    fn draft() -> ToolDraft {
        ToolDraft {
            name: "Furadeira".to_string(),
            asset_tag: "4521".to_string(),
            details: "Bosch 600W".to_string(),
            location: "Oficina".to_string(),
            category: Some(CategoryId::from_string("power".to_string()).unwrap()),
            image_ref: None,
        }
    }

    fn grant() -> RegistrationGrant {
        BadgeGate::new(AcceptedBadges::new(["123456789"]))
            .authorize("123456789")
            .unwrap()
    }

    #[test]
    fn test_required_fields_in_order() {
        let cases = [
            (ToolDraft { name: " ".into(), ..draft() }, "tool name is required"),
            (ToolDraft { asset_tag: String::new(), ..draft() }, "asset tag is required"),
            (ToolDraft { location: String::new(), ..draft() }, "storage location is required"),
            (ToolDraft { category: None, ..draft() }, "category is required"),
        ];
        for (draft, expected) in cases {
            match draft.validate() {
                Err(Error::Validation(msg)) => assert_eq!(msg, expected),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_asset_tag_grammar_enforced() {
        let err = ToolDraft { asset_tag: "45-21".into(), ..draft() }.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_encodes_code() {
        let store = Arc::new(MemoryStore::new());
        let registry = ToolRegistry::new(store.clone());

        let tool = registry.register(&grant(), draft(), None).await.unwrap();
        assert_eq!(tool.availability, Availability::Available);
        assert_eq!(CodeCodec::decode(&tool.code).unwrap(), tool.asset_tag);

        let err = registry.register(&grant(), draft(), None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
