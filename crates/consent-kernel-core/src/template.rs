//! Named, write-once grant bundles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audit::AccessAudit;
use crate::batch::BatchReport;
use crate::bounded::BoundedVec;
use crate::category::CategoryRegistry;
use crate::consent::ConsentStore;
use crate::error::{ConsentError, Result, Subject};
use crate::history::MAX_DETAILS_LEN;
use crate::types::{truncate_utf8, Call, Category, Principal};

/// Maximum number of categories in a template.
pub const MAX_TEMPLATE_CATEGORIES: usize = 10;

/// Maximum template name length in bytes.
pub const MAX_TEMPLATE_NAME_LEN: usize = 64;

/// Maximum description length in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 256;

pub type TemplateCategories = BoundedVec<Category, MAX_TEMPLATE_CATEGORIES>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub categories: TemplateCategories,
    pub duration: u64,
    pub description: String,
}

/// Templates by name. There is no update and no delete.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    by_name: BTreeMap<String, Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(templates: impl IntoIterator<Item = Template>) -> Self {
        Self {
            by_name: templates
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    /// Create a template. Every category must be valid at creation time.
    pub fn create(
        &mut self,
        registry: &CategoryRegistry,
        name: &str,
        categories: Vec<Category>,
        duration: u64,
        description: &str,
    ) -> Result<&Template> {
        if name.is_empty() || name.len() > MAX_TEMPLATE_NAME_LEN {
            return Err(ConsentError::InvalidTemplate(format!(
                "name must be 1-{} bytes",
                MAX_TEMPLATE_NAME_LEN
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(ConsentError::Conflict(Subject::Template(name.to_owned())));
        }
        if duration == 0 {
            return Err(ConsentError::InvalidDuration);
        }
        let count = categories.len();
        let categories = TemplateCategories::try_from(categories).map_err(|_| {
            ConsentError::InvalidTemplate(format!(
                "{} categories, at most {} allowed",
                count, MAX_TEMPLATE_CATEGORIES
            ))
        })?;
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ConsentError::InvalidTemplate(format!(
                "description exceeds {} bytes",
                MAX_DESCRIPTION_LEN
            )));
        }
        if let Some(bad) = categories.iter().find(|c| !registry.is_valid(c.as_str())) {
            return Err(ConsentError::InvalidCategory(bad.to_string()));
        }

        let template = Template {
            name: name.to_owned(),
            categories,
            duration,
            description: description.to_owned(),
        };
        Ok(self.by_name.entry(name.to_owned()).or_insert(template))
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.by_name.get(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.by_name.values()
    }

    /// Grant every category of the template from the caller to `grantee`.
    ///
    /// Individual grant failures land in the report; only a missing
    /// template fails the call.
    pub fn apply<A: AccessAudit>(
        &self,
        store: &mut ConsentStore<A>,
        call: &Call,
        grantee: &Principal,
        name: &str,
    ) -> Result<BatchReport> {
        let template = self
            .get(name)
            .ok_or_else(|| ConsentError::TemplateNotFound(name.to_owned()))?;

        // Grant notes are capped tighter than descriptions.
        let mut notes = template.description.clone();
        truncate_utf8(&mut notes, MAX_DETAILS_LEN);
        let notes = (!notes.is_empty()).then_some(notes.as_str());

        let mut report = BatchReport::default();
        for category in template.categories.iter() {
            let result = store
                .grant(call, &call.caller, grantee, category, template.duration, notes)
                .map(|_| ());
            report.record(category, result);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAudit;

    fn cats(labels: &[&str]) -> Vec<Category> {
        labels.iter().map(|l| Category::new(*l).unwrap()).collect()
    }

    fn registry() -> CategoryRegistry {
        let mut reg = CategoryRegistry::new();
        reg.bootstrap();
        reg
    }

    #[test]
    fn test_create_and_get() {
        let mut store = TemplateStore::new();
        store
            .create(&registry(), "basic", cats(&["allergies", "imaging"]), 100, "clinic")
            .unwrap();
        let template = store.get("basic").unwrap();
        assert_eq!(template.categories.len(), 2);
        assert_eq!(template.duration, 100);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["basic"]);
    }

    #[test]
    fn test_create_rejections() {
        let reg = registry();
        let mut store = TemplateStore::new();

        let err = store
            .create(&reg, "t", cats(&["allergies", "dental"]), 100, "")
            .unwrap_err();
        assert!(matches!(err, ConsentError::InvalidCategory(_)));

        let err = store
            .create(&reg, "t", cats(&["allergies"; 11]), 100, "")
            .unwrap_err();
        assert!(matches!(err, ConsentError::InvalidTemplate(_)));

        let err = store.create(&reg, "t", cats(&["allergies"]), 0, "").unwrap_err();
        assert_eq!(err, ConsentError::InvalidDuration);

        let err = store.create(&reg, "", cats(&["allergies"]), 1, "").unwrap_err();
        assert!(matches!(err, ConsentError::InvalidTemplate(_)));

        let long = "d".repeat(MAX_DESCRIPTION_LEN + 1);
        let err = store.create(&reg, "t", cats(&["allergies"]), 1, &long).unwrap_err();
        assert!(matches!(err, ConsentError::InvalidTemplate(_)));

        assert!(store.get("t").is_none());
    }

    #[test]
    fn test_write_once() {
        let reg = registry();
        let mut store = TemplateStore::new();
        store.create(&reg, "t", cats(&["allergies"]), 5, "").unwrap();
        let err = store.create(&reg, "t", cats(&["imaging"]), 9, "").unwrap_err();
        assert_eq!(err, ConsentError::Conflict(Subject::Template("t".into())));
        assert_eq!(store.get("t").unwrap().duration, 5);
    }

    #[test]
    fn test_apply_grants_in_order_and_tolerates_failures() {
        let mut consents = ConsentStore::new(NullAudit);
        let mut templates = TemplateStore::new();
        templates
            .create(
                consents.categories(),
                "checkup",
                cats(&["allergies", "imaging"]),
                50,
                "annual checkup",
            )
            .unwrap();

        let granter = Principal::new("u1").unwrap();
        let grantee = Principal::new("u2").unwrap();
        let call = Call::new(granter.clone(), 10);
        consents
            .grant(&call, &granter, &grantee, &cats(&["imaging"])[0], 5, None)
            .unwrap();

        let report = templates.apply(&mut consents, &call, &grantee, "checkup").unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(matches!(report.outcomes[1].result, Err(ConsentError::Conflict(_))));

        let allergies = &cats(&["allergies"])[0];
        let record = consents.check(&granter, &grantee, allergies, 60).unwrap();
        assert_eq!(record.expiry, 60);
    }

    #[test]
    fn test_apply_missing_template() {
        let mut consents = ConsentStore::new(NullAudit);
        let templates = TemplateStore::new();
        let call = Call::new(Principal::new("u1").unwrap(), 0);
        let err = templates
            .apply(&mut consents, &call, &Principal::new("u2").unwrap(), "nope")
            .unwrap_err();
        assert_eq!(err, ConsentError::TemplateNotFound("nope".into()));
    }
}
