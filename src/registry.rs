//! Owned registry of per-connection integrations with explicit lifecycle.
//!
//! The registry creates an integration the first time its connection is requested,
//! hands out shared handles afterwards, and closes every client on
//! [`shutdown`](ClientRegistry::shutdown).

// self
use crate::{_prelude::*, auth::ConnectionId, client::Integration};

type Factory<I> = Box<dyn Fn(&ConnectionId) -> Result<I> + Send + Sync>;

/// Aggregate health across registered integrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	/// Every integration is reachable (or none is registered).
	Healthy,
	/// Some, but not all, integrations are reachable.
	Degraded,
	/// No registered integration is reachable.
	Unhealthy,
}

/// Reachability of one integration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
	/// Connection that was probed.
	pub connection_id: ConnectionId,
	/// Whether the probe succeeded.
	pub healthy: bool,
	/// Time at which the probe finished.
	pub checked_at: OffsetDateTime,
}

/// Result of [`ClientRegistry::health_report`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
	/// Aggregate status.
	pub status: HealthStatus,
	/// One entry per registered integration, ordered by connection.
	pub checks: Vec<HealthCheck>,
}
impl HealthReport {
	/// Aggregates individual checks.
	pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
		let healthy = checks.iter().filter(|check| check.healthy).count();
		let status = if healthy == checks.len() {
			HealthStatus::Healthy
		} else if healthy == 0 {
			HealthStatus::Unhealthy
		} else {
			HealthStatus::Degraded
		};

		Self { status, checks }
	}

	/// Number of reachable integrations.
	pub fn healthy_count(&self) -> usize {
		self.checks.iter().filter(|check| check.healthy).count()
	}
}

/// Registry mapping connections to shared integrations.
pub struct ClientRegistry<I>
where
	I: Integration,
{
	factory: Factory<I>,
	entries: Mutex<BTreeMap<ConnectionId, Arc<I>>>,
}
impl<I> ClientRegistry<I>
where
	I: Integration,
{
	/// Creates an empty registry that builds integrations with `factory`.
	pub fn new<F>(factory: F) -> Self
	where
		F: 'static + Fn(&ConnectionId) -> Result<I> + Send + Sync,
	{
		Self { factory: Box::new(factory), entries: Mutex::new(BTreeMap::new()) }
	}

	/// Returns the integration for `connection_id`, creating it on first use.
	///
	/// Concurrent first calls for the same connection build exactly one integration.
	///
	/// The factory runs while the registry lock is held. It must not call back into this
	/// registry; the lock is not re-entrant and such a call deadlocks.
	pub fn get_or_create(&self, connection_id: &ConnectionId) -> Result<Arc<I>> {
		let mut entries = self.entries.lock();

		if let Some(existing) = entries.get(connection_id) {
			return Ok(existing.clone());
		}

		let created = Arc::new((self.factory)(connection_id)?);

		entries.insert(connection_id.clone(), created.clone());

		Ok(created)
	}

	/// Returns the integration if one was created.
	pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<I>> {
		self.entries.lock().get(connection_id).cloned()
	}

	/// Removes and closes the integration for `connection_id`.
	pub fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<I>> {
		let removed = self.entries.lock().remove(connection_id);

		if let Some(integration) = &removed {
			integration.client().close();
		}

		removed
	}

	/// Number of registered integrations.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` if nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Connections currently registered.
	pub fn connections(&self) -> Vec<ConnectionId> {
		self.entries.lock().keys().cloned().collect()
	}

	/// Closes every client and empties the registry.
	pub fn shutdown(&self) {
		let drained = std::mem::take(&mut *self.entries.lock());

		for integration in drained.values() {
			integration.client().close();
		}
	}

	/// Probes every registered integration.
	pub async fn health_report(&self) -> HealthReport {
		let snapshot = self
			.entries
			.lock()
			.iter()
			.map(|(id, integration)| (id.clone(), integration.clone()))
			.collect::<Vec<_>>();
		let mut checks = Vec::with_capacity(snapshot.len());

		for (connection_id, integration) in snapshot {
			let healthy = integration.test_connection().await;

			checks.push(HealthCheck { connection_id, healthy, checked_at: OffsetDateTime::now_utc() });
		}

		HealthReport::from_checks(checks)
	}
}
impl<I> Debug for ClientRegistry<I>
where
	I: Integration,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientRegistry").field("connections", &self.connections()).finish()
	}
}
