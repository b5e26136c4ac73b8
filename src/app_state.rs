use std::sync::Arc;

use crate::{
    auth::JwtService,
    config::{Config, StorageBackend},
    db::{Database, MemoryStore, MongoStore, Store},
    errors::AppResult,
    repositories::{
        InMemoryNotificationRepository, MongoNotificationRepository, NotificationRepository,
    },
    services::{
        email::{EmailSender, HttpEmailSender, LogEmailSender},
        file_store::{FileStore, LocalFileStore},
        AccountService, AnswerService, AttemptService, CatalogService, NotificationService,
        PaymentService, ReportService, RoleRegistry, UserService,
    },
};

/// External collaborators the services are built from.
pub struct Components {
    pub store: Arc<dyn Store>,
    pub notification_repository: Arc<dyn NotificationRepository>,
    pub email: Arc<dyn EmailSender>,
    pub files: Arc<dyn FileStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub roles: Arc<RoleRegistry>,
    pub account_service: Arc<AccountService>,
    pub user_service: Arc<UserService>,
    pub catalog_service: Arc<CatalogService>,
    pub attempt_service: Arc<AttemptService>,
    pub answer_service: Arc<AnswerService>,
    pub payment_service: Arc<PaymentService>,
    pub notification_service: Arc<NotificationService>,
    pub report_service: Arc<ReportService>,
    pub jwt_service: JwtService,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let (store, notification_repository): (Arc<dyn Store>, Arc<dyn NotificationRepository>) =
            match config.storage_backend {
                StorageBackend::Mongo => {
                    let db = Database::connect(&config).await?;
                    let notifications = Arc::new(MongoNotificationRepository::new(&db));
                    (Arc::new(MongoStore::new(db)), notifications)
                }
                StorageBackend::Memory => {
                    log::warn!("using the in-memory store; data is lost on restart");
                    (
                        Arc::new(MemoryStore::new()),
                        Arc::new(InMemoryNotificationRepository::new()),
                    )
                }
            };
        store.ensure_indexes().await?;
        notification_repository.ensure_indexes().await?;

        let email: Arc<dyn EmailSender> = match &config.email_relay_url {
            Some(url) => Arc::new(HttpEmailSender::new(url, &config.email_from)?),
            None => Arc::new(LogEmailSender),
        };
        let files = Arc::new(LocalFileStore::new(
            &config.upload_dir,
            &config.upload_base_url,
        ));

        let state = Self::from_components(
            config,
            Components {
                store,
                notification_repository,
                email,
                files,
            },
        )
        .await?;

        if state.roles.list_roles().await.is_empty() {
            if state.config.storage_backend == StorageBackend::Memory {
                state.roles.seed().await?;
            } else {
                log::warn!("no roles found; run the seed-roles binary before registering users");
            }
        }
        Ok(state)
    }

    /// Wires every service over the given collaborators and loads the role cache.
    pub async fn from_components(config: Config, components: Components) -> AppResult<Self> {
        let Components {
            store,
            notification_repository,
            email,
            files,
        } = components;

        let roles = Arc::new(RoleRegistry::load(store.clone()).await?);
        let jwt_service = JwtService::new(&config.jwt_secret, config.jwt_expiration_hours);
        let notification_service = Arc::new(NotificationService::new(
            notification_repository,
            config.notification_ttl_days,
        ));

        let account_service = Arc::new(AccountService::new(
            store.clone(),
            roles.clone(),
            email,
            jwt_service.clone(),
            &config.app_base_url,
            config.history_retention_days,
        ));
        let user_service = Arc::new(UserService::new(store.clone(), roles.clone()));
        let catalog_service = Arc::new(CatalogService::new(store.clone(), files));
        let attempt_service = Arc::new(AttemptService::new(
            store.clone(),
            notification_service.clone(),
        ));
        let answer_service = Arc::new(AnswerService::new(store.clone()));
        let payment_service = Arc::new(PaymentService::new(
            store.clone(),
            notification_service.clone(),
        ));
        let report_service = Arc::new(ReportService::new(
            store.clone(),
            notification_service.clone(),
            payment_service.clone(),
        ));

        Ok(Self {
            store,
            roles,
            account_service,
            user_service,
            catalog_service,
            attempt_service,
            answer_service,
            payment_service,
            notification_service,
            report_service,
            jwt_service,
            config: Arc::new(config),
        })
    }

    /// Fully in-memory state with a seeded role set.
    pub async fn in_memory(config: Config) -> AppResult<Self> {
        let files = Arc::new(LocalFileStore::new(
            &config.upload_dir,
            &config.upload_base_url,
        ));
        let state = Self::from_components(
            config,
            Components {
                store: Arc::new(MemoryStore::new()),
                notification_repository: Arc::new(InMemoryNotificationRepository::new()),
                email: Arc::new(LogEmailSender),
                files,
            },
        )
        .await?;
        state.roles.seed().await?;
        Ok(state)
    }
}
