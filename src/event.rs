//! Juju event parsing.
//!
//! The Juju agent runs the operator with `JUJU_DISPATCH_PATH` set to the event
//! being dispatched, `hooks/<hook name>` or `actions/<action name>`. This
//! module converts that path into a structured [`Event`].

use std::fmt;

use log::debug;
use thiserror::Error;

/// Container name declared in the charm metadata.
const CONTAINER_NAME: &str = "maubot";

/// A dispatched Juju event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Hook(Hook),
    Action(Action),
}

/// Lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Install,
    UpgradeCharm,
    ConfigChanged,
    /// The Pebble API of the workload container became reachable
    PebbleReady,
    /// A relation changed on one of the endpoints of the charm
    Relation(Endpoint, RelationEvent),
    /// Any hook the operator does not act upon
    Other(String),
}

/// Relation endpoints declared in the charm metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Postgresql,
    MatrixAuth,
    Ingress,
    MetricsEndpoint,
    GrafanaDashboard,
    Logging,
}

/// Relation lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEvent {
    Joined,
    Changed,
    Departed,
    Broken,
}

/// Operator actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateAdmin,
    DeleteAdmin,
    ResetAdminPassword,
    RegisterClientAccount,
    /// An action absent from the charm actions
    Unknown(String),
}

/// Errors that can occur while parsing the dispatch path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    /// The dispatch path is empty
    #[error("no event to dispatch")]
    Empty,
    /// The dispatch path is neither a hook nor an action
    #[error("invalid dispatch path {0}")]
    InvalidPath(String),
}

impl Event {
    /// Parses a dispatch path into an Event.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or does not start with `hooks/`
    /// or `actions/`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let event = Event::parse("hooks/postgresql-relation-changed")?;
    /// assert_eq!(
    ///     event,
    ///     Event::Hook(Hook::Relation(Endpoint::Postgresql, RelationEvent::Changed))
    /// );
    /// ```
    pub fn parse(dispatch_path: &str) -> Result<Self, EventParseError> {
        let path = dispatch_path.trim();
        if path.is_empty() {
            return Err(EventParseError::Empty);
        }

        debug!("parse dispatch path {}", path);

        match path.split_once('/') {
            Some(("hooks", name)) if !name.is_empty() => Ok(Event::Hook(Hook::parse(name))),
            Some(("actions", name)) if !name.is_empty() => Ok(Event::Action(Action::parse(name))),
            _ => Err(EventParseError::InvalidPath(path.to_owned())),
        }
    }
}

impl Hook {
    fn parse(name: &str) -> Self {
        match name {
            "install" => Hook::Install,
            "upgrade-charm" => Hook::UpgradeCharm,
            "config-changed" => Hook::ConfigChanged,
            _ if name == format!("{}-pebble-ready", CONTAINER_NAME) => Hook::PebbleReady,
            _ => Self::parse_relation(name).unwrap_or_else(|| Hook::Other(name.to_owned())),
        }
    }

    fn parse_relation(name: &str) -> Option<Self> {
        let (endpoint, event) = name.rsplit_once("-relation-")?;

        let endpoint = match endpoint {
            "postgresql" => Endpoint::Postgresql,
            "matrix-auth" => Endpoint::MatrixAuth,
            "ingress" => Endpoint::Ingress,
            "metrics-endpoint" => Endpoint::MetricsEndpoint,
            "grafana-dashboard" => Endpoint::GrafanaDashboard,
            "logging" => Endpoint::Logging,
            _ => return None,
        };
        let event = match event {
            "joined" => RelationEvent::Joined,
            "changed" => RelationEvent::Changed,
            "departed" => RelationEvent::Departed,
            "broken" => RelationEvent::Broken,
            _ => return None,
        };

        Some(Hook::Relation(endpoint, event))
    }

    /// Whether the hook requires the workload to be reconciled.
    pub fn reconciles(&self) -> bool {
        !matches!(self, Hook::Other(_))
    }
}

impl Action {
    fn parse(name: &str) -> Self {
        match name {
            "create-admin" => Action::CreateAdmin,
            "delete-admin" => Action::DeleteAdmin,
            "reset-admin-password" => Action::ResetAdminPassword,
            "register-client-account" => Action::RegisterClientAccount,
            _ => Action::Unknown(name.to_owned()),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Event::Hook(hook) => write!(f, "hook {:?}", hook),
            Event::Action(action) => write!(f, "action {:?}", action),
        }
    }
}
