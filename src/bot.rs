//! Bot runner: the reconciliation loop.
//!
//! Each poll:
//! - Fetches the full source order book
//! - On the first successful fetch, records every order as historical (the cutoff)
//! - Mirrors each COMPLETE order that is neither historical nor already mapped
//! - Records the mapping once the destination accepts the order
//!
//! The mapping store is the only de-duplication signal that survives a restart.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{OrderPlacer, OrderSource};
use crate::audit::{AuditEvent, AuditLog};
use crate::db::{MappingDetails, MappingEntry, MappingStore};
use crate::error::{CopierError, CopierResult};
use crate::models::{DestinationOrderRequest, SourceOrder};
use crate::trading::{CopierConfig, InstrumentLookup, InstrumentResolver};

/// Cooperative stop signal for a running [`Bot`].
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    /// Orders belonging to the cutoff (all of them on the first poll)
    pub historical: usize,
    pub mirrored: usize,
    pub already_mapped: usize,
    pub not_complete: usize,
    /// Orders skipped because resolution failed on an earlier poll
    pub previously_unresolved: usize,
    /// Orders skipped because they were placed but could not be mapped
    pub placed_unmapped: usize,
    pub resolve_failures: usize,
    pub placement_failures: usize,
    pub store_failures: usize,
    pub duplicate_keys: usize,
    /// Set when the order book could not be fetched
    pub source_error: Option<String>,
}

impl PollReport {
    fn has_activity(&self) -> bool {
        self.mirrored > 0
            || self.resolve_failures > 0
            || self.placement_failures > 0
            || self.store_failures > 0
            || self.duplicate_keys > 0
    }

    fn log(&self) {
        if self.source_error.is_some() {
            return;
        }

        if !self.has_activity() {
            debug!(
                fetched = self.fetched,
                already_mapped = self.already_mapped,
                not_complete = self.not_complete,
                "Poll complete, nothing to mirror"
            );
            return;
        }

        info!(
            fetched = self.fetched,
            historical = self.historical,
            mirrored = self.mirrored,
            already_mapped = self.already_mapped,
            not_complete = self.not_complete,
            previously_unresolved = self.previously_unresolved,
            placed_unmapped = self.placed_unmapped,
            resolve_failures = self.resolve_failures,
            placement_failures = self.placement_failures,
            store_failures = self.store_failures,
            duplicate_keys = self.duplicate_keys,
            "Poll complete"
        );
    }
}

/// Main bot runner.
pub struct Bot {
    config: CopierConfig,
    source: Arc<dyn OrderSource>,
    placer: Arc<dyn OrderPlacer>,
    resolver: InstrumentResolver,
    store: MappingStore,
    audit: Arc<dyn AuditLog>,

    // Runtime state
    cutoff: Option<HashSet<String>>,
    unresolvable: HashSet<String>,
    // Placed on the destination but missing from the store
    placed_unmapped: HashSet<String>,
    stats: BotStats,

    // Shutdown signal
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Bot {
    pub fn new(
        config: CopierConfig,
        source: Arc<dyn OrderSource>,
        placer: Arc<dyn OrderPlacer>,
        lookup: Arc<dyn InstrumentLookup>,
        store: MappingStore,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let resolver = InstrumentResolver::new(lookup, config.request_timeout());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            source,
            placer,
            resolver,
            store,
            audit,
            cutoff: None,
            unresolvable: HashSet::new(),
            placed_unmapped: HashSet::new(),
            stats: BotStats::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    pub fn cutoff_established(&self) -> bool {
        self.cutoff.is_some()
    }

    fn is_historical(&self, order_id: &str) -> bool {
        self.cutoff
            .as_ref()
            .is_some_and(|ids| ids.contains(order_id))
    }

    /// Main run loop. Returns cumulative stats after a shutdown signal.
    pub async fn run(mut self) -> Result<BotStats> {
        info!(
            poll_interval = ?self.config.poll_interval(),
            timeout = ?self.config.request_timeout(),
            multiplier = self.config.quantity_multiplier,
            product = %self.config.product_type,
            tif = %self.config.time_in_force,
            mappings = self.store.len(),
            "Starting copier loop"
        );
        self.audit.record(&AuditEvent::Started {
            multiplier: self.config.quantity_multiplier,
            existing_mappings: self.store.len(),
        });

        // Register shutdown handler
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            handle.trigger();
        });

        let mut poll_interval = interval(self.config.poll_interval());
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let mut stop = self.shutdown_rx.clone();
            tokio::select! {
                _ = poll_interval.tick() => {}
                _ = stop.changed() => continue,
            }

            self.tick().await.log();
        }

        Ok(self.shutdown().await)
    }

    /// Single iteration of the main loop.
    pub async fn tick(&mut self) -> PollReport {
        let mut report = PollReport::default();
        self.stats.polls += 1;

        let orders = match timeout(self.config.request_timeout(), self.source.list_orders()).await
        {
            Ok(Ok(orders)) => orders,
            Ok(Err(e)) => return self.source_failed(report, e),
            Err(_) => {
                let e = CopierError::SourceUnavailable(format!(
                    "order list timed out after {:?}",
                    self.config.request_timeout()
                ));
                return self.source_failed(report, e);
            }
        };
        report.fetched = orders.len();

        if self.cutoff.is_none() {
            self.establish_cutoff(&orders);
            report.historical = orders.len();
            return report;
        }

        for order in &orders {
            if self.is_historical(&order.order_id) {
                report.historical += 1;
                continue;
            }
            if let Some(entry) = self.store.get(&order.order_id) {
                debug!(
                    source = %order.order_id,
                    destination = %entry.destination_order_id,
                    "Already mirrored"
                );
                report.already_mapped += 1;
                continue;
            }
            if !order.is_complete() {
                report.not_complete += 1;
                continue;
            }
            if self.unresolvable.contains(&order.order_id) {
                report.previously_unresolved += 1;
                continue;
            }
            if self.placed_unmapped.contains(&order.order_id) {
                report.placed_unmapped += 1;
                continue;
            }

            match self.mirror(order).await {
                Ok(_) => report.mirrored += 1,
                Err(CopierError::UnresolvedInstrument { .. }) => report.resolve_failures += 1,
                Err(CopierError::DuplicateKey(_)) => report.duplicate_keys += 1,
                Err(e) if e.is_placement_failure() => report.placement_failures += 1,
                Err(_) => report.store_failures += 1,
            }
        }

        self.stats.absorb(&report);
        report
    }

    fn source_failed(&mut self, mut report: PollReport, e: CopierError) -> PollReport {
        warn!(error = %e, "Failed to fetch source orders, retrying next interval");
        self.stats.source_failures += 1;
        report.source_error = Some(e.to_string());
        report
    }

    fn establish_cutoff(&mut self, orders: &[SourceOrder]) {
        info!(
            historical = orders.len(),
            "Cutoff established; orders already on the book will NOT be tracked"
        );

        for order in orders {
            self.audit.record(&AuditEvent::HistoricalSkip {
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
                status: order.status.to_string(),
            });
        }

        self.stats.historical = orders.len();
        self.cutoff = Some(orders.iter().map(|o| o.order_id.clone()).collect());
    }

    /// Resolve, place, and record one eligible order.
    async fn mirror(&mut self, order: &SourceOrder) -> CopierResult<MappingEntry> {
        debug!(
            source = %order.order_id,
            symbol = %order.symbol,
            placed_at = ?order.placed_at,
            "Mirroring order"
        );

        let (contract, instrument) = match self.resolver.resolve(&order.symbol).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(order_id = %order.order_id, symbol = %order.symbol, error = %e, "Resolve failed");
                self.unresolvable.insert(order.order_id.clone());
                self.audit.record(&AuditEvent::ResolveFailed {
                    order_id: order.order_id.clone(),
                    symbol: order.symbol.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        self.audit.record(&AuditEvent::Resolved {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            contract: contract.to_string(),
            instrument_id: instrument.instrument_id,
        });

        let request = DestinationOrderRequest::mirror(
            order,
            instrument,
            self.config.quantity_multiplier,
            self.config.product_type,
            self.config.time_in_force,
            &self.config.order_tag_prefix,
        );

        let destination_id = match self.place(&request).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    order_id = %order.order_id,
                    symbol = %order.symbol,
                    error = %e,
                    "Placement failed, will retry next poll"
                );
                self.audit.record(&AuditEvent::PlacementFailed {
                    order_id: order.order_id.clone(),
                    symbol: order.symbol.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        info!(
            source = %order.order_id,
            destination = %destination_id,
            exchange = %order.exchange,
            symbol = %order.symbol,
            side = %order.side,
            qty = request.quantity,
            "Order mirrored"
        );
        self.audit.record(&AuditEvent::Placed {
            order_id: order.order_id.clone(),
            destination_order_id: destination_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            source_quantity: order.filled_quantity,
            quantity: request.quantity,
            average_price: order.average_price,
        });

        let details = MappingDetails {
            symbol: &order.symbol,
            side: order.side,
            source_quantity: order.filled_quantity,
            destination_quantity: request.quantity,
        };

        match self.store.put(&order.order_id, &destination_id, details).await {
            Ok(entry) => {
                self.audit.record(&AuditEvent::MappingWritten {
                    order_id: entry.source_order_id.clone(),
                    destination_order_id: entry.destination_order_id.clone(),
                });
                Ok(entry)
            }
            Err(e @ CopierError::DuplicateKey(_)) => {
                error!(
                    source = %order.order_id,
                    destination = %destination_id,
                    "Mapping already exists; destination order may be a duplicate"
                );
                self.audit.record(&AuditEvent::DuplicateKey {
                    order_id: order.order_id.clone(),
                });
                Err(e)
            }
            Err(e) => {
                error!(
                    source = %order.order_id,
                    destination = %destination_id,
                    error = %e,
                    "Failed to record mapping; order will not be placed again by this process"
                );
                self.placed_unmapped.insert(order.order_id.clone());
                self.audit.record(&AuditEvent::MappingFailed {
                    order_id: order.order_id.clone(),
                    destination_order_id: destination_id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn place(&self, request: &DestinationOrderRequest) -> CopierResult<String> {
        match timeout(self.config.request_timeout(), self.placer.place(request)).await {
            Ok(result) => result,
            Err(_) => Err(CopierError::PlacementTransportError(format!(
                "placement timed out after {:?}",
                self.config.request_timeout()
            ))),
        }
    }

    /// Get current stats.
    pub fn get_stats(&self) -> BotStats {
        let mut stats = self.stats.clone();
        stats.mappings = self.store.len();
        stats.is_running = !*self.shutdown_rx.borrow();
        stats
    }

    /// Graceful shutdown.
    async fn shutdown(self) -> BotStats {
        info!("Shutting down copier...");
        let mut stats = self.get_stats();
        stats.is_running = false;
        self.store.close().await;
        info!("Copier shutdown complete");
        stats
    }
}

/// Cumulative bot statistics.
#[derive(Debug, Clone)]
pub struct BotStats {
    pub started_at: DateTime<Utc>,
    pub polls: u64,
    pub source_failures: u64,
    pub historical: usize,
    pub mirrored: u64,
    pub resolve_failures: u64,
    pub placement_failures: u64,
    pub store_failures: u64,
    pub duplicate_keys: u64,
    pub mappings: usize,
    pub is_running: bool,
}

impl BotStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            polls: 0,
            source_failures: 0,
            historical: 0,
            mirrored: 0,
            resolve_failures: 0,
            placement_failures: 0,
            store_failures: 0,
            duplicate_keys: 0,
            mappings: 0,
            is_running: true,
        }
    }

    fn absorb(&mut self, report: &PollReport) {
        self.mirrored += report.mirrored as u64;
        self.resolve_failures += report.resolve_failures as u64;
        self.placement_failures += report.placement_failures as u64;
        self.store_failures += report.store_failures as u64;
        self.duplicate_keys += report.duplicate_keys as u64;
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Copier Statistics ===")?;
        writeln!(f, "Uptime:             {}s", self.uptime().as_secs())?;
        writeln!(f, "Polls:              {} (source failures: {})", self.polls, self.source_failures)?;
        writeln!(f, "Historical orders:  {}", self.historical)?;
        writeln!(f, "Mirrored:           {}", self.mirrored)?;
        writeln!(f, "Resolve failures:   {}", self.resolve_failures)?;
        writeln!(f, "Placement failures: {}", self.placement_failures)?;
        writeln!(
            f,
            "Store failures:     {} (duplicate keys: {})",
            self.store_failures, self.duplicate_keys
        )?;
        writeln!(f, "Mappings on file:   {}", self.mappings)?;
        writeln!(
            f,
            "Status:             {}",
            if self.is_running { "Running" } else { "Stopped" }
        )?;
        Ok(())
    }
}
