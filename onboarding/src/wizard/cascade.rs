// Location cascade: state -> district -> taluk -> village
//
// Invariant: a level's option list is only valid while its parent's selection is unchanged.
// Selecting at any level wipes every level below it (selection and options) before the child
// fetch is issued. Fetch failures leave the child list empty; nothing is cached.

use super::form::{fields, RegistrationForm};
use crate::error::ClientResult;
use crate::models::responses::LocationOption;
use async_trait::async_trait;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeLevel {
    State,
    District,
    Taluk,
    Village,
}

impl CascadeLevel {
    pub const ALL: [CascadeLevel; 4] = [
        CascadeLevel::State,
        CascadeLevel::District,
        CascadeLevel::Taluk,
        CascadeLevel::Village,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::State => 0,
            Self::District => 1,
            Self::Taluk => 2,
            Self::Village => 3,
        }
    }

    pub fn child(self) -> Option<Self> {
        match self {
            Self::State => Some(Self::District),
            Self::District => Some(Self::Taluk),
            Self::Taluk => Some(Self::Village),
            Self::Village => None,
        }
    }

    /// Every level strictly below this one, nearest first.
    pub fn descendants(self) -> impl Iterator<Item = CascadeLevel> {
        Self::ALL.into_iter().skip(self.index() + 1)
    }

    pub fn field(self) -> &'static str {
        match self {
            Self::State => fields::STATE,
            Self::District => fields::DISTRICT,
            Self::Taluk => fields::TALUK,
            Self::Village => fields::VILLAGE,
        }
    }

    /// The level that owns form field `field`, if any.
    pub fn for_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.field() == field)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::State => "State",
            Self::District => "District",
            Self::Taluk => "Taluk",
            Self::Village => "Village",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.field()
    }
}

/// Source of option lists for each level.
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn states(&self) -> ClientResult<Vec<LocationOption>>;

    /// Options for `level`, keyed by the id selected one level up.
    async fn children(&self, level: CascadeLevel, parent_id: &str)
        -> ClientResult<Vec<LocationOption>>;
}

/// A child fetch that was issued for a specific parent selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub level: CascadeLevel,
    pub parent_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LevelState {
    options: Vec<LocationOption>,
    selected: Option<LocationOption>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationCascade {
    levels: [LevelState; 4],
}

impl LocationCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self, level: CascadeLevel) -> &[LocationOption] {
        &self.levels[level.index()].options
    }

    pub fn selected(&self, level: CascadeLevel) -> Option<&LocationOption> {
        self.levels[level.index()].selected.as_ref()
    }

    pub fn set_states(&mut self, states: Vec<LocationOption>) {
        self.levels[CascadeLevel::State.index()].options = states;
    }

    /// Drop selections and option lists of every level below `level`.
    pub fn clear_below(&mut self, level: CascadeLevel) {
        for d in level.descendants() {
            self.levels[d.index()] = LevelState::default();
        }
    }

    /// Record a selection. Clears all descendants and returns the child fetch to issue
    /// (none for villages).
    pub fn select(&mut self, level: CascadeLevel, option: LocationOption) -> Option<PendingFetch> {
        self.clear_below(level);
        let parent_id = option.id.clone();
        self.levels[level.index()].selected = Some(option);
        level.child().map(|child| PendingFetch {
            level: child,
            parent_id,
        })
    }

    /// Apply a fetch result. Returns false when the result is stale (parent changed since
    /// the fetch was issued) and was discarded.
    pub fn apply_fetch(
        &mut self,
        fetch: &PendingFetch,
        result: ClientResult<Vec<LocationOption>>,
    ) -> bool {
        let Some(parent_idx) = fetch.level.index().checked_sub(1) else {
            return false;
        };
        let parent_level = CascadeLevel::ALL[parent_idx];
        let still_current = self
            .selected(parent_level)
            .map(|p| p.id == fetch.parent_id)
            .unwrap_or(false);
        if !still_current {
            info!(
                "[PHASE: wizard] [STEP: cascade] Discarding stale {} list for {} {}",
                fetch.level.as_str(),
                parent_level.as_str(),
                fetch.parent_id
            );
            return false;
        }

        let options = match result {
            Ok(list) => list,
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: cascade] Failed to load {} for {} {}: {}",
                    fetch.level.as_str(),
                    parent_level.as_str(),
                    fetch.parent_id,
                    e.log_details()
                );
                Vec::new()
            }
        };
        self.levels[fetch.level.index()].options = options;
        true
    }

    /// Mirror the selections into the form: selected ids for set levels, null for the rest.
    pub fn write_into(&self, form: &mut RegistrationForm) {
        for level in CascadeLevel::ALL {
            match self.selected(level) {
                Some(opt) => form.set(level.field(), opt.id.clone()),
                None => form.clear(level.field()),
            }
        }
    }
}

/// Load the top-level list. Failure leaves it empty.
pub async fn load_states<D: LocationDirectory + ?Sized>(
    cascade: &mut LocationCascade,
    directory: &D,
) {
    cascade.clear_below(CascadeLevel::State);
    cascade.levels[CascadeLevel::State.index()].selected = None;
    match directory.states().await {
        Ok(states) => cascade.set_states(states),
        Err(e) => {
            warn!(
                "[PHASE: wizard] [STEP: cascade] Failed to load states: {}",
                e.log_details()
            );
            cascade.set_states(Vec::new());
        }
    }
}

/// Select `option` at `level`, clear everything below, and fetch the immediate child list.
pub async fn select_parent<D: LocationDirectory + ?Sized>(
    cascade: &mut LocationCascade,
    directory: &D,
    level: CascadeLevel,
    option: LocationOption,
) {
    info!(
        "[PHASE: wizard] [STEP: cascade] Selected {} {} ({})",
        level.as_str(),
        option.id,
        option.name
    );
    if let Some(fetch) = cascade.select(level, option) {
        let result = directory.children(fetch.level, &fetch.parent_id).await;
        cascade.apply_fetch(&fetch, result);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory directory keyed by (level, parent id). Records every call.
    #[derive(Default)]
    pub struct StubDirectory {
        pub states: Vec<LocationOption>,
        pub children: HashMap<(CascadeLevel, String), Vec<LocationOption>>,
        pub fail_for: Vec<(CascadeLevel, String)>,
        pub calls: Mutex<Vec<(CascadeLevel, String)>>,
    }

    impl StubDirectory {
        pub fn tamil_nadu() -> Self {
            let mut children = HashMap::new();
            children.insert(
                (CascadeLevel::District, "1".to_string()),
                vec![
                    LocationOption::new("5", "Madurai"),
                    LocationOption::new("6", "Theni"),
                ],
            );
            children.insert(
                (CascadeLevel::District, "2".to_string()),
                vec![LocationOption::new("20", "Ernakulam")],
            );
            children.insert(
                (CascadeLevel::Taluk, "5".to_string()),
                vec![LocationOption::new("51", "Melur")],
            );
            children.insert(
                (CascadeLevel::Village, "51".to_string()),
                vec![LocationOption::new("512", "Kottampatti")],
            );
            Self {
                states: vec![
                    LocationOption::new("1", "Tamil Nadu"),
                    LocationOption::new("2", "Kerala"),
                ],
                children,
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LocationDirectory for StubDirectory {
        async fn states(&self) -> ClientResult<Vec<LocationOption>> {
            Ok(self.states.clone())
        }

        async fn children(
            &self,
            level: CascadeLevel,
            parent_id: &str,
        ) -> ClientResult<Vec<LocationOption>> {
            let key = (level, parent_id.to_string());
            self.calls.lock().unwrap().push(key.clone());
            if self.fail_for.contains(&key) {
                return Err(ClientError::network("connection reset"));
            }
            Ok(self.children.get(&key).cloned().unwrap_or_default())
        }
    }

    fn opt(id: &str, name: &str) -> LocationOption {
        LocationOption::new(id, name)
    }

    #[tokio::test]
    async fn state_then_district_populates_children() {
        let dir = StubDirectory::tamil_nadu();
        let mut c = LocationCascade::new();
        load_states(&mut c, &dir).await;
        assert_eq!(c.options(CascadeLevel::State).len(), 2);

        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        assert_eq!(c.options(CascadeLevel::District)[0].name, "Madurai");

        select_parent(&mut c, &dir, CascadeLevel::District, opt("5", "Madurai")).await;
        assert_eq!(c.options(CascadeLevel::Taluk), &[opt("51", "Melur")]);
    }

    #[tokio::test]
    async fn changing_state_clears_all_descendants() {
        let dir = StubDirectory::tamil_nadu();
        let mut c = LocationCascade::new();
        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        select_parent(&mut c, &dir, CascadeLevel::District, opt("5", "Madurai")).await;
        select_parent(&mut c, &dir, CascadeLevel::Taluk, opt("51", "Melur")).await;
        select_parent(&mut c, &dir, CascadeLevel::Village, opt("512", "Kottampatti")).await;

        // Synchronous part of selection: everything below is gone before the refetch lands.
        let fetch = c.select(CascadeLevel::State, opt("2", "Kerala"));
        for level in [
            CascadeLevel::District,
            CascadeLevel::Taluk,
            CascadeLevel::Village,
        ] {
            assert!(c.selected(level).is_none(), "{:?} still selected", level);
            assert!(c.options(level).is_empty(), "{:?} still has options", level);
        }
        assert_eq!(
            fetch,
            Some(PendingFetch {
                level: CascadeLevel::District,
                parent_id: "2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn changing_district_keeps_state() {
        let dir = StubDirectory::tamil_nadu();
        let mut c = LocationCascade::new();
        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        select_parent(&mut c, &dir, CascadeLevel::District, opt("5", "Madurai")).await;
        select_parent(&mut c, &dir, CascadeLevel::Taluk, opt("51", "Melur")).await;

        select_parent(&mut c, &dir, CascadeLevel::District, opt("6", "Theni")).await;
        assert_eq!(c.selected(CascadeLevel::State).unwrap().id, "1");
        assert_eq!(c.options(CascadeLevel::District).len(), 2);
        assert!(c.selected(CascadeLevel::Taluk).is_none());
        assert!(c.selected(CascadeLevel::Village).is_none());
        assert!(c.options(CascadeLevel::Village).is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_leaves_child_list_empty() {
        let mut dir = StubDirectory::tamil_nadu();
        dir.fail_for.push((CascadeLevel::District, "1".to_string()));
        let mut c = LocationCascade::new();
        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        assert!(c.options(CascadeLevel::District).is_empty());
        assert_eq!(c.selected(CascadeLevel::State).unwrap().id, "1");
    }

    #[tokio::test]
    async fn reselecting_same_parent_refetches() {
        let dir = StubDirectory::tamil_nadu();
        let mut c = LocationCascade::new();
        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        select_parent(&mut c, &dir, CascadeLevel::State, opt("1", "Tamil Nadu")).await;
        assert_eq!(dir.call_count(), 2);
    }

    #[tokio::test]
    async fn village_selection_issues_no_fetch() {
        let dir = StubDirectory::tamil_nadu();
        let mut c = LocationCascade::new();
        select_parent(&mut c, &dir, CascadeLevel::Village, opt("512", "Kottampatti")).await;
        assert_eq!(dir.call_count(), 0);
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut c = LocationCascade::new();
        let first = c.select(CascadeLevel::State, opt("1", "Tamil Nadu")).unwrap();
        let _second = c.select(CascadeLevel::State, opt("2", "Kerala")).unwrap();
        let applied = c.apply_fetch(&first, Ok(vec![opt("5", "Madurai")]));
        assert!(!applied);
        assert!(c.options(CascadeLevel::District).is_empty());
    }

    #[test]
    fn write_into_mirrors_selection_and_nulls_the_rest() {
        let mut c = LocationCascade::new();
        let mut form = RegistrationForm::new();
        form.set(fields::TALUK, "99");
        c.select(CascadeLevel::State, opt("1", "Tamil Nadu"));
        c.write_into(&mut form);
        assert_eq!(form.value(fields::STATE), Some("1"));
        assert_eq!(form.get(fields::TALUK), None);
    }
}
