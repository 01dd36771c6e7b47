// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};

/// A natural-language expectation about an agent response,
/// e.g. "Response should acknowledge new customer status".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCriterion {
    /// Criterion text, passed verbatim to every judge
    pub criterion: String,

    /// Multiplier applied to the consensus score (>= 0.0).
    /// Does not influence pass/fail.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Optional longer description for reports
    #[serde(default)]
    pub description: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl SemanticCriterion {
    pub fn new(criterion: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            weight: default_weight(),
            description: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Weight must be a finite, non-negative number
    pub fn has_valid_weight(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0
    }
}

impl From<&str> for SemanticCriterion {
    fn from(criterion: &str) -> Self {
        Self::new(criterion)
    }
}
