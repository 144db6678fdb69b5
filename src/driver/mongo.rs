use async_trait::async_trait;
use mongodb::{
    Client, Database,
    bson::doc,
    options::{ClientOptions, DatabaseOptions, ReadPreference, SelectionCriteria},
};

use super::{ClientSettings, Driver, ReadTarget, Session};
use crate::error::Result;

/// Driver backed by the official MongoDB client.
#[derive(Debug, Clone, Default)]
pub struct MongoDriver;

#[async_trait]
impl Driver for MongoDriver {
    type Session = MongoSession;

    async fn connect(&self, settings: &ClientSettings) -> Result<MongoSession> {
        let mut options = ClientOptions::parse(&settings.uri).await?;
        options.app_name = Some(settings.app_name.clone());
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.connect_timeout);
        if settings.secondary_preferred {
            options.selection_criteria = Some(SelectionCriteria::ReadPreference(
                ReadPreference::SecondaryPreferred { options: None },
            ));
        }

        let client = Client::with_options(options)?;
        Ok(MongoSession { client })
    }
}

#[derive(Debug, Clone)]
pub struct MongoSession {
    client: Client,
}

impl MongoSession {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn criteria(target: ReadTarget) -> SelectionCriteria {
    match target {
        ReadTarget::Primary => SelectionCriteria::ReadPreference(ReadPreference::Primary),
        ReadTarget::Secondary => {
            SelectionCriteria::ReadPreference(ReadPreference::Secondary { options: None })
        }
    }
}

#[async_trait]
impl Session for MongoSession {
    type Database = Database;

    async fn ping(&self, target: ReadTarget) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .selection_criteria(criteria(target))
            .await?;
        Ok(())
    }

    fn database(&self, name: &str, target: Option<ReadTarget>) -> Database {
        match target {
            Some(target) => self.client.database_with_options(
                name,
                DatabaseOptions::builder()
                    .selection_criteria(criteria(target))
                    .build(),
            ),
            None => self.client.database(name),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        // shutdown consumes the handle; clones share the same topology
        self.client.clone().shutdown().await;
        Ok(())
    }
}
