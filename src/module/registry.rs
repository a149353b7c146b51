//! An explicit, process-wide registry of module classes, replacing the
//! metaclass auto-registration of `swarmclone/module_manager.py`'s
//! `ModuleManager` (§9 "Registry as global mutable state"): classes are
//! added by an explicit `register` call, keyed by `(role, type_name)`, and
//! the registry is handed to the controller by value — once moved in,
//! nothing outside the controller can add to it, which is this crate's
//! substitute for "frozen before `start` is first called".

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::Role;
use crate::module::ModuleFactory;

#[derive(Default)]
pub struct Registry {
    factories: HashMap<(Role, String), Arc<dyn ModuleFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a module class. Fails with `InvalidRole` for the
    /// `Controller` pseudo-role (§4.2 Registration constraints); the
    /// exactly-one-LLM rule is enforced at instantiation time by the
    /// controller, not here, since it concerns live instances, not classes.
    pub fn register(&mut self, factory: impl ModuleFactory + 'static) -> Result<()> {
        let role = factory.role();
        if !Role::registrable().contains(&role) {
            return Err(Error::InvalidRole(format!(
                "cannot register module class under role {role}"
            )));
        }
        self.factories
            .insert((role, factory.type_name().to_string()), Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, role: Role, type_name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(&(role, type_name.to_string())).cloned()
    }

    pub fn by_role(&self, role: Role) -> Vec<Arc<dyn ModuleFactory>> {
        self.factories
            .iter()
            .filter(|((r, _), _)| *r == role)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        Role::registrable().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::dummy::DummyAsrFactory;

    #[test]
    fn registering_under_controller_role_is_rejected() {
        struct Bogus;
        impl ModuleFactory for Bogus {
            fn role(&self) -> Role {
                Role::Controller
            }
            fn type_name(&self) -> &str {
                "bogus"
            }
            fn description(&self) -> &str {
                "invalid"
            }
            fn config_schema(&self) -> crate::module::ConfigSchema {
                vec![]
            }
            fn construct(
                &self,
                _fields: &HashMap<String, crate::module::ConfigValue>,
            ) -> Result<Box<dyn crate::module::Module>> {
                unreachable!()
            }
        }

        let mut reg = Registry::new();
        let err = reg.register(Bogus).unwrap_err();
        assert!(matches!(err, Error::InvalidRole(_)));
    }

    #[test]
    fn lookup_by_role_and_name_round_trips() {
        let mut reg = Registry::new();
        reg.register(DummyAsrFactory).unwrap();
        assert!(reg.get(Role::Asr, "DummyAsr").is_some());
        assert_eq!(reg.by_role(Role::Asr).len(), 1);
        assert!(reg.get(Role::Llm, "DummyAsr").is_none());
    }
}
