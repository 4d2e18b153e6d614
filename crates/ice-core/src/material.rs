//! Material catalog.
//!
//! Layers, dies and the channel walls refer to materials through a
//! [`MaterialId`] handle; the catalog owned by the stack description is the
//! only place where the properties live.

use serde::{Deserialize, Serialize};

use crate::error::{IceError, Result};

/// Handle into a [`MaterialCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// W / (um · K)
    pub thermal_conductivity: f64,
    /// J / (um³ · K)
    pub volumetric_heat_capacity: f64,
}

impl Material {
    pub fn new(name: impl Into<String>, thermal_conductivity: f64, volumetric_heat_capacity: f64) -> Self {
        Self {
            name: name.into(),
            thermal_conductivity,
            volumetric_heat_capacity,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialCatalog {
    materials: Vec<Material>,
}

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material and return its handle. Names must be unique and
    /// both properties strictly positive.
    pub fn add(&mut self, material: Material) -> Result<MaterialId> {
        if self.find(&material.name).is_some() {
            return Err(IceError::config(format!(
                "material '{}' defined twice",
                material.name
            )));
        }
        if !(material.thermal_conductivity > 0.0 && material.volumetric_heat_capacity > 0.0) {
            return Err(IceError::config(format!(
                "material '{}' needs positive conductivity and heat capacity",
                material.name
            )));
        }
        self.materials.push(material);
        Ok(MaterialId(self.materials.len() - 1))
    }

    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(MaterialId)
    }

    /// Look a material up by name, failing with a configuration error.
    pub fn require(&self, name: &str) -> Result<MaterialId> {
        self.find(name)
            .ok_or_else(|| IceError::config(format!("unknown material '{}'", name)))
    }

    pub fn get(&self, id: MaterialId) -> &Material {
        &self.materials[id.0]
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut cat = MaterialCatalog::new();
        let si = cat.add(Material::new("silicon", 1.3e-4, 1.628e-12)).unwrap();
        let cu = cat.add(Material::new("copper", 3.9e-4, 3.45e-12)).unwrap();
        assert_ne!(si, cu);
        assert_eq!(cat.find("copper"), Some(cu));
        assert_eq!(cat.get(si).name, "silicon");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut cat = MaterialCatalog::new();
        cat.add(Material::new("silicon", 1.3e-4, 1.628e-12)).unwrap();
        assert!(cat.add(Material::new("silicon", 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_non_positive_rejected() {
        let mut cat = MaterialCatalog::new();
        assert!(cat.add(Material::new("void", 0.0, 1.0)).is_err());
        assert!(cat.require("void").is_err());
    }
}
