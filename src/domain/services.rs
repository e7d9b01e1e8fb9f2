use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

/// Services priced in the reference configuration, in output order.
pub const REFERENCE_SERVICES: [&str; 10] = [
    "Photography",
    "Videography",
    "Drone Photography",
    "Drone Video",
    "3D Virtual Tour",
    "Floor Plans",
    "Virtual Staging",
    "Twilight Photography",
    "Agent Intro/Outro",
    "Voiceover",
];

/// Column index of a service inside a [`ServiceCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(usize);

impl ServiceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered, duplicate-free list of priced services.
///
/// The order given at construction is the iteration order used everywhere
/// else (table columns, document keys).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCatalog {
    names: Vec<String>,
    index: HashMap<String, ServiceId>,
}

impl ServiceCatalog {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };

        for name in names {
            let name: String = name.into();
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "pricing.services".to_string(),
                    value: name.clone(),
                    reason: "Service name cannot be empty".to_string(),
                });
            }
            if catalog.index.contains_key(trimmed) {
                return Err(EtlError::InvalidConfigValueError {
                    field: "pricing.services".to_string(),
                    value: trimmed.to_string(),
                    reason: "Duplicate service name".to_string(),
                });
            }
            let id = ServiceId(catalog.names.len());
            catalog.index.insert(trimmed.to_string(), id);
            catalog.names.push(trimmed.to_string());
        }

        if catalog.names.is_empty() {
            return Err(EtlError::InvalidConfigValueError {
                field: "pricing.services".to_string(),
                value: "[]".to_string(),
                reason: "At least one service is required".to_string(),
            });
        }

        Ok(catalog)
    }

    /// The ten-service catalog the pricing dataset is published with.
    pub fn reference() -> Self {
        let names: Vec<String> = REFERENCE_SERVICES.iter().map(|s| s.to_string()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), ServiceId(i)))
            .collect();
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact (trimmed) name lookup.
    pub fn id_of(&self, name: &str) -> Option<ServiceId> {
        self.index.get(name.trim()).copied()
    }

    pub fn name(&self, id: ServiceId) -> &str {
        &self.names[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        (0..self.names.len()).map(ServiceId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (ServiceId(i), name.as_str()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::reference()
    }
}
