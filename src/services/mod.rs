//! Business logic services

pub mod catalog;
pub mod fines;
pub mod gateway;
pub mod lending;
pub mod payments;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{config::LibraryPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub lending: lending::LendingService,
    pub fines: fines::FinesService,
    pub payments: payments::PaymentsService,
    pub stats: stats::StatsService,
    pub users: users::UsersService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository, lending policy and gateway
    pub fn new(
        repository: Repository,
        policy: LibraryPolicy,
        gateway: Arc<dyn gateway::PaymentGateway>,
    ) -> Self {
        let policy = Arc::new(policy);
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            lending: lending::LendingService::new(repository.clone(), policy.clone()),
            fines: fines::FinesService::new(repository.clone()),
            payments: payments::PaymentsService::new(repository.clone(), policy.clone(), gateway),
            stats: stats::StatsService::new(repository.clone(), policy),
            users: users::UsersService::new(repository.clone()),
            repository,
        }
    }
}
