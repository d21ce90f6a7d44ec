//! The workforce roster: one runtime per specialist over a shared registry

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::profile::AgentProfile;
use super::{LeasingAgent, MarketingAgent, PropertyAgent};
use crate::activity::ActivitySink;
use crate::completion::{CompletionClient, ModelParameters, RetryPolicy};
use crate::runtime::AgentRuntime;
use crate::tools::{ScopedTools, ToolRegistry};
use crate::types::AgentKind;

/// Every specialist, wired to the same completion client, registry and activity sink
#[derive(Clone)]
pub struct Workforce {
    leasing: LeasingAgent,
    marketing: MarketingAgent,
    property: PropertyAgent,
}

impl Workforce {
    pub fn builder(
        client: Arc<dyn CompletionClient>,
        registry: Arc<ToolRegistry>,
        activities: Arc<dyn ActivitySink>,
    ) -> WorkforceBuilder {
        WorkforceBuilder {
            client,
            registry,
            activities,
            retry: RetryPolicy::default(),
            model_parameters: ModelParameters::default(),
            profiles: HashMap::new(),
        }
    }

    pub fn leasing(&self) -> &LeasingAgent {
        &self.leasing
    }

    pub fn marketing(&self) -> &MarketingAgent {
        &self.marketing
    }

    pub fn property(&self) -> &PropertyAgent {
        &self.property
    }

    /// The runtime behind a specialist
    pub fn runtime(&self, kind: AgentKind) -> &AgentRuntime {
        match kind {
            AgentKind::Leasing => self.leasing.runtime(),
            AgentKind::Marketing => self.marketing.runtime(),
            AgentKind::Property => self.property.runtime(),
        }
    }
}

pub struct WorkforceBuilder {
    client: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
    activities: Arc<dyn ActivitySink>,
    retry: RetryPolicy,
    model_parameters: ModelParameters,
    profiles: HashMap<AgentKind, AgentProfile>,
}

impl WorkforceBuilder {
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sampling defaults for agents whose profile does not override them
    pub fn model_parameters(mut self, params: ModelParameters) -> Self {
        self.model_parameters = params;
        self
    }

    pub fn profile(mut self, kind: AgentKind, profile: AgentProfile) -> Self {
        self.profiles.insert(kind, profile);
        self
    }

    fn runtime(&self, kind: AgentKind) -> Arc<AgentRuntime> {
        let profile = self.profiles.get(&kind).cloned().unwrap_or_default();
        let config = profile.configuration(kind, self.model_parameters);
        let tools = ScopedTools::new(self.registry.clone(), config.tool_set.clone());
        info!(
            "{} agent ready: {} tools, max {} iterations",
            kind,
            config.tool_set.len(),
            config.max_loop_iterations
        );
        Arc::new(
            AgentRuntime::new(
                Arc::new(config),
                self.client.clone(),
                Arc::new(tools),
                self.activities.clone(),
            )
            .with_retry_policy(self.retry),
        )
    }

    pub fn build(self) -> Workforce {
        Workforce {
            leasing: LeasingAgent::new(self.runtime(AgentKind::Leasing)),
            marketing: MarketingAgent::new(self.runtime(AgentKind::Marketing)),
            property: PropertyAgent::new(self.runtime(AgentKind::Property)),
        }
    }
}
