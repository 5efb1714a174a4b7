//! Cascading address resolution.
//!
//! Destination selection walks region → sub-region → locality against the
//! external address directory. Directory failures fail open: the option
//! list comes back empty and the buyer can retry by re-selecting the
//! parent level.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::errors::CheckoutError;
use crate::integrations::AddressDirectoryApi;
use crate::models::{AddressOption, AddressSelection};

#[derive(Clone)]
pub struct AddressResolver {
    directory: Arc<dyn AddressDirectoryApi>,
}

impl AddressResolver {
    pub fn new(directory: Arc<dyn AddressDirectoryApi>) -> Self {
        Self { directory }
    }

    /// Region listing, empty on directory failure.
    pub async fn regions(&self) -> Vec<AddressOption> {
        match self.directory.regions().await {
            Ok(options) => options,
            Err(e) => {
                warn!(error = %e, "region listing failed, returning no options");
                vec![]
            }
        }
    }

    pub async fn sub_regions(&self, region_code: &str) -> Vec<AddressOption> {
        match self.directory.sub_regions(region_code).await {
            Ok(options) => options,
            Err(e) => {
                warn!(region_code, error = %e, "sub-region listing failed, returning no options");
                vec![]
            }
        }
    }

    pub async fn localities(&self, sub_region_code: &str) -> Vec<AddressOption> {
        match self.directory.localities(sub_region_code).await {
            Ok(options) => options,
            Err(e) => {
                warn!(sub_region_code, error = %e, "locality listing failed, returning no options");
                vec![]
            }
        }
    }

    /// Loads the top-level region options into a fresh selection.
    pub async fn load_regions(&self, selection: &mut AddressSelection) {
        selection.region_options = self.regions().await;
    }

    /// Selects a region and loads its sub-region options. Any previously
    /// selected sub-region and locality are cleared, along with their
    /// option lists.
    #[instrument(skip(self, selection))]
    pub async fn select_region(
        &self,
        selection: &mut AddressSelection,
        code: &str,
    ) -> Result<(), CheckoutError> {
        let region = Self::find_option(&selection.region_options, code)
            .ok_or_else(|| CheckoutError::NotFound(format!("Unknown region {}", code)))?;

        selection.sub_region = None;
        selection.locality = None;
        selection.locality_options = vec![];
        selection.sub_region_options = self.sub_regions(&region.code).await;
        selection.region = Some(region);
        Ok(())
    }

    /// Selects a sub-region and loads its locality options, clearing any
    /// previously selected locality.
    #[instrument(skip(self, selection))]
    pub async fn select_sub_region(
        &self,
        selection: &mut AddressSelection,
        code: &str,
    ) -> Result<(), CheckoutError> {
        if selection.region.is_none() {
            return Err(CheckoutError::InvalidOperation(
                "Select a region before a sub-region".to_string(),
            ));
        }
        let sub_region = Self::find_option(&selection.sub_region_options, code)
            .ok_or_else(|| CheckoutError::NotFound(format!("Unknown sub-region {}", code)))?;

        selection.locality = None;
        selection.locality_options = self.localities(&sub_region.code).await;
        selection.sub_region = Some(sub_region);
        Ok(())
    }

    #[instrument(skip(self, selection))]
    pub async fn select_locality(
        &self,
        selection: &mut AddressSelection,
        code: &str,
    ) -> Result<(), CheckoutError> {
        if selection.sub_region.is_none() {
            return Err(CheckoutError::InvalidOperation(
                "Select a sub-region before a locality".to_string(),
            ));
        }
        let locality = Self::find_option(&selection.locality_options, code)
            .ok_or_else(|| CheckoutError::NotFound(format!("Unknown locality {}", code)))?;
        selection.locality = Some(locality);
        Ok(())
    }

    fn find_option(options: &[AddressOption], code: &str) -> Option<AddressOption> {
        options.iter().find(|o| o.code == code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::memory::InMemoryAddressDirectory;

    fn resolver() -> (AddressResolver, Arc<InMemoryAddressDirectory>) {
        let directory = Arc::new(InMemoryAddressDirectory::new());
        (AddressResolver::new(directory.clone()), directory)
    }

    async fn selection_with_locality(resolver: &AddressResolver) -> AddressSelection {
        let mut sel = AddressSelection::default();
        resolver.load_regions(&mut sel).await;
        resolver.select_region(&mut sel, "R01").await.unwrap();
        resolver.select_sub_region(&mut sel, "R01-D1").await.unwrap();
        resolver.select_locality(&mut sel, "R01-D1-W1").await.unwrap();
        sel
    }

    #[tokio::test]
    async fn full_cascade_resolves_destination() {
        let (resolver, _) = resolver();
        let sel = selection_with_locality(&resolver).await;
        assert!(sel.is_complete());
        let dest = sel.destination().unwrap();
        assert_eq!(dest.region, "R01");
        assert_eq!(dest.locality, "R01-D1-W1");
    }

    #[tokio::test]
    async fn selecting_region_clears_downstream() {
        let (resolver, _) = resolver();
        let mut sel = selection_with_locality(&resolver).await;

        resolver.select_region(&mut sel, "R03").await.unwrap();
        assert!(sel.sub_region.is_none());
        assert!(sel.locality.is_none());
        assert!(sel.locality_options.is_empty());
        assert!(!sel.sub_region_options.is_empty());
    }

    #[tokio::test]
    async fn selecting_sub_region_clears_locality() {
        let (resolver, _) = resolver();
        let mut sel = selection_with_locality(&resolver).await;

        resolver.select_sub_region(&mut sel, "R01-D2").await.unwrap();
        assert!(sel.sub_region.is_some());
        assert!(sel.locality.is_none());
    }

    #[tokio::test]
    async fn directory_failure_yields_empty_options() {
        let (resolver, directory) = resolver();
        let mut sel = AddressSelection::default();
        resolver.load_regions(&mut sel).await;

        directory.set_failing(true);
        resolver.select_region(&mut sel, "R01").await.unwrap();
        assert!(sel.sub_region_options.is_empty());

        // Retrying the parent selection works once the directory recovers.
        directory.set_failing(false);
        resolver.select_region(&mut sel, "R01").await.unwrap();
        assert!(!sel.sub_region_options.is_empty());
    }

    #[tokio::test]
    async fn locality_requires_sub_region() {
        let (resolver, _) = resolver();
        let mut sel = AddressSelection::default();
        resolver.load_regions(&mut sel).await;
        resolver.select_region(&mut sel, "R01").await.unwrap();

        let err = resolver
            .select_locality(&mut sel, "R01-D1-W1")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidOperation(_)));
    }
}
