// src/services/rate_limit.rs

use std::{collections::HashMap, net::IpAddr, sync::Mutex};

use chrono::{DateTime, Duration, Utc};

// Acima deste tamanho o mapa é limpo a cada tentativa ou falha registrada.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub max_failures: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::minutes(10),
            lockout: Duration::minutes(15),
        }
    }
}

/// Chave de tentativa: (ip do cliente, e-mail normalizado).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    ip: IpAddr,
    email: String,
}

impl AttemptKey {
    pub fn new(ip: IpAddr, email: &str) -> Self {
        Self {
            ip,
            email: email.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Clear,
    Failing { failures: u32 },
    Locked { until: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct AttemptEntry {
    failures: u32,
    window_start: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    // Tentativas reservadas que ainda não terminaram.
    in_flight: u32,
}

impl AttemptEntry {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            failures: 0,
            window_start: now,
            locked_until: None,
            in_flight: 0,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, policy: &RateLimitPolicy) -> bool {
        match self.locked_until {
            Some(until) => now >= until,
            None => now - self.window_start > policy.window,
        }
    }

    // Zera contagem e bloqueio vencidos; as reservas em curso continuam.
    fn refresh(&mut self, now: DateTime<Utc>, policy: &RateLimitPolicy) {
        if self.is_expired(now, policy) {
            self.failures = 0;
            self.window_start = now;
            self.locked_until = None;
        }
    }

    fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.failures == 0 && self.locked_until.is_none()
    }
}

/// Motivo da recusa de uma tentativa antes de olhar a senha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptRejection {
    Locked { until: DateTime<Utc> },
    /// Falhas registradas mais tentativas em curso já somam o limite.
    Saturated,
}

impl AttemptRejection {
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        match self {
            AttemptRejection::Locked { until } => (*until - now).num_seconds().max(1) as u64,
            AttemptRejection::Saturated => 1,
        }
    }
}

/// Reserva de uma tentativa de login. Se for descartada sem `succeed` ou
/// `fail` (erro de banco, pedido cancelado), só devolve a vaga.
#[must_use]
#[derive(Debug)]
pub struct AttemptPermit<'a> {
    limiter: &'a LoginRateLimiter,
    key: AttemptKey,
    settled: bool,
}

impl AttemptPermit<'_> {
    pub fn succeed(mut self) {
        self.settled = true;
        self.limiter.settle_success(&self.key);
    }

    pub fn fail(mut self) -> AttemptState {
        self.settled = true;
        self.limiter.settle_failure(&self.key, Utc::now())
    }
}

impl Drop for AttemptPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.release(&self.key);
        }
    }
}

/// Tabela de tentativas de login do processo. Melhor esforço: não
/// sobrevive a reinício.
#[derive(Debug, Default)]
pub struct LoginRateLimiter {
    policy: RateLimitPolicy,
    entries: Mutex<HashMap<AttemptKey, AttemptEntry>>,
}

impl LoginRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reserva uma tentativa. A reserva conta para o limite até ser
    /// resolvida, então pedidos simultâneos não passam todos pela checagem.
    pub fn try_begin(&self, key: &AttemptKey) -> Result<AttemptPermit<'_>, AttemptRejection> {
        self.try_begin_at(key, Utc::now())
    }

    pub fn record_failure(&self, key: &AttemptKey) -> AttemptState {
        self.record_failure_at(key, Utc::now())
    }

    pub fn state(&self, key: &AttemptKey) -> AttemptState {
        self.state_at(key, Utc::now())
    }

    pub fn clear(&self, key: &AttemptKey) {
        self.lock().remove(key);
    }

    pub fn try_begin_at(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
    ) -> Result<AttemptPermit<'_>, AttemptRejection> {
        let mut entries = self.lock();
        self.prune(&mut entries, now);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| AttemptEntry::fresh(now));
        entry.refresh(now, &self.policy);

        if let Some(until) = entry.locked_until {
            return Err(AttemptRejection::Locked { until });
        }
        if entry.failures + entry.in_flight >= self.policy.max_failures {
            return Err(AttemptRejection::Saturated);
        }

        entry.in_flight += 1;
        Ok(AttemptPermit {
            limiter: self,
            key: key.clone(),
            settled: false,
        })
    }

    pub fn record_failure_at(&self, key: &AttemptKey, now: DateTime<Utc>) -> AttemptState {
        let mut entries = self.lock();
        self.prune(&mut entries, now);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| AttemptEntry::fresh(now));
        self.register_failure(entry, key, now)
    }

    pub fn state_at(&self, key: &AttemptKey, now: DateTime<Utc>) -> AttemptState {
        let mut entries = self.lock();

        let Some(entry) = entries.get(key) else {
            return AttemptState::Clear;
        };
        if entry.is_expired(now, &self.policy) {
            if entry.in_flight == 0 {
                entries.remove(key);
            }
            return AttemptState::Clear;
        }
        match entry.locked_until {
            Some(until) => AttemptState::Locked { until },
            None if entry.failures == 0 => AttemptState::Clear,
            None => AttemptState::Failing {
                failures: entry.failures,
            },
        }
    }

    fn settle_failure(&self, key: &AttemptKey, now: DateTime<Utc>) -> AttemptState {
        let mut entries = self.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| AttemptEntry::fresh(now));
        entry.in_flight = entry.in_flight.saturating_sub(1);
        self.register_failure(entry, key, now)
    }

    // Login certo zera a chave; reservas de outros pedidos continuam valendo.
    fn settle_success(&self, key: &AttemptKey) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.failures = 0;
            entry.locked_until = None;
            if entry.is_idle() {
                entries.remove(key);
            }
        }
    }

    fn release(&self, key: &AttemptKey) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            if entry.is_idle() {
                entries.remove(key);
            }
        }
    }

    fn register_failure(
        &self,
        entry: &mut AttemptEntry,
        key: &AttemptKey,
        now: DateTime<Utc>,
    ) -> AttemptState {
        if let Some(until) = entry.locked_until.filter(|until| now < *until) {
            return AttemptState::Locked { until };
        }
        entry.refresh(now, &self.policy);

        entry.failures += 1;
        if entry.failures >= self.policy.max_failures {
            let until = now + self.policy.lockout;
            entry.locked_until = Some(until);
            tracing::warn!(ip = %key.ip, "login bloqueado até {}", until);
            return AttemptState::Locked { until };
        }

        AttemptState::Failing {
            failures: entry.failures,
        }
    }

    fn prune(&self, entries: &mut HashMap<AttemptKey, AttemptEntry>, now: DateTime<Utc>) {
        if entries.len() > PRUNE_THRESHOLD {
            entries.retain(|_, entry| entry.in_flight > 0 || !entry.is_expired(now, &self.policy));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AttemptKey, AttemptEntry>> {
        // Um pânico com o lock na mão não deixa a tabela inconsistente.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
