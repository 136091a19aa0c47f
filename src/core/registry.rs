//! Router instance registry
//!
//! Resolves a configured router name to a handle of the right type, bound to
//! that name as its configuration scope.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use log::{debug, info};
use once_cell::sync::Lazy;

use super::{
    error::{RouterError, RouterResult},
    traits::{Router, RouterCreateFn, RouterScope},
};
use crate::{
    config::{Config, RouterConfig},
    router::{hipache, planb},
    store::ConnectorCache,
};

static ROUTER_BUILDER_REGISTRY: Lazy<HashMap<&'static str, RouterCreateFn>> = Lazy::new(|| {
    let arr: Vec<(&str, RouterCreateFn)> = vec![
        (hipache::ROUTER_TYPE, hipache::create_hipache_router),
        (planb::ROUTER_TYPE, planb::create_planb_router),
    ];
    arr.into_iter().collect()
});

pub struct RouterRegistry {
    configs: HashMap<String, Arc<RouterConfig>>,
    factories: HashMap<&'static str, RouterCreateFn>,
    connectors: Arc<ConnectorCache>,
    instances: DashMap<String, Arc<dyn Router>>,
}

impl RouterRegistry {
    pub fn new(routers: HashMap<String, RouterConfig>, connectors: Arc<ConnectorCache>) -> Self {
        Self {
            configs: routers
                .into_iter()
                .map(|(name, config)| (name, Arc::new(config)))
                .collect(),
            factories: ROUTER_BUILDER_REGISTRY.clone(),
            connectors,
            instances: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config, connectors: Arc<ConnectorCache>) -> Self {
        Self::new(config.routers.clone(), connectors)
    }

    /// Adds or replaces the factory for a router type.
    pub fn register(&mut self, router_type: &'static str, factory: RouterCreateFn) {
        debug!("Registering router type {router_type}");
        self.factories.insert(router_type, factory);
    }

    /// Router configured under `name`, built on first use.
    pub fn get(&self, name: &str) -> RouterResult<Arc<dyn Router>> {
        if let Some(router) = self.instances.get(name) {
            return Ok(router.value().clone());
        }

        let config = self
            .configs
            .get(name)
            .ok_or_else(|| RouterError::UnknownRouter(name.to_string()))?;
        let router_type = config.router_type();
        let factory = self
            .factories
            .get(router_type)
            .ok_or_else(|| RouterError::UnknownRouterType(router_type.to_string()))?;

        let router = factory(RouterScope {
            name: name.to_string(),
            config: config.clone(),
            connectors: self.connectors.clone(),
        });
        info!("Loaded {router_type} router {name}");

        Ok(self
            .instances
            .entry(name.to_string())
            .or_insert(router)
            .value()
            .clone())
    }

    /// Configured router names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn connectors(&self) -> &Arc<ConnectorCache> {
        &self.connectors
    }
}
