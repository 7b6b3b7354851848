use tracing::info;
use ward_schema::{PlayerId, ResourceBundle, ResourceKind, Wallet};

use crate::engine::Engine;
use crate::error::{EngineError, NotFoundError, ValidationError};
use crate::store::{GameStore, Versioned, WriteBatch, WriteOp};

pub struct Wallets<'a> {
    engine: &'a Engine,
}

impl<'a> Wallets<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn balance(&self, player: PlayerId) -> Result<ResourceBundle, EngineError> {
        Ok(load_wallet(self.engine.store().as_ref(), player)?.value.balances)
    }

    pub fn credit(
        &self,
        player: PlayerId,
        amount: &ResourceBundle,
    ) -> Result<ResourceBundle, EngineError> {
        self.update(player, "wallet.credit", |wallet| {
            wallet.credit(amount);
            Ok(())
        })
    }

    /// All-or-nothing debit; rejected with `InsufficientResources` on any shortfall.
    pub fn debit(
        &self,
        player: PlayerId,
        amount: &ResourceBundle,
    ) -> Result<ResourceBundle, EngineError> {
        self.update(player, "wallet.debit", |wallet| {
            wallet.debit(amount).map_err(ValidationError::from)
        })
    }

    /// Trades `ratio * amount` of `from` for `amount` of `to`.
    pub fn exchange(
        &self,
        player: PlayerId,
        from: ResourceKind,
        to: ResourceKind,
        amount: u32,
    ) -> Result<ResourceBundle, EngineError> {
        if from == to {
            return Err(ValidationError::InvalidExchange {
                reason: "source and target resource are the same",
            }
            .into());
        }
        if amount == 0 {
            return Err(ValidationError::InvalidExchange {
                reason: "amount must be positive",
            }
            .into());
        }
        let ratio = self.engine.config().economy().exchange_ratio.max(1);
        let cost = ResourceBundle::single(from, amount.saturating_mul(ratio));
        let gain = ResourceBundle::single(to, amount);
        let balances = self.update(player, "wallet.exchange", |wallet| {
            wallet.debit(&cost).map_err(ValidationError::from)?;
            wallet.credit(&gain);
            Ok(())
        })?;
        info!(
            target: "ward::wallet",
            %player,
            from = from.as_str(),
            to = to.as_str(),
            amount,
            "wallet.exchanged"
        );
        Ok(balances)
    }

    fn update<F>(
        &self,
        player: PlayerId,
        label: &'static str,
        mut change: F,
    ) -> Result<ResourceBundle, EngineError>
    where
        F: FnMut(&mut Wallet) -> Result<(), ValidationError>,
    {
        let store = self.engine.store();
        self.engine.config().retry().run_on_conflict(label, |_| {
            let current = load_wallet(store.as_ref(), player)?;
            let mut wallet = current.value;
            change(&mut wallet)?;
            let balances = wallet.balances;
            let mut batch = WriteBatch::new();
            batch.push(WriteOp::PutWallet {
                wallet,
                expected: current.version,
            });
            store.commit(batch)?;
            Ok(balances)
        })
    }
}

pub(crate) fn load_wallet(
    store: &dyn GameStore,
    player: PlayerId,
) -> Result<Versioned<Wallet>, EngineError> {
    store
        .wallet(player)?
        .ok_or_else(|| NotFoundError::Wallet(player).into())
}

/// Write that credits `amount` to an already-read wallet.
pub(crate) fn refund_op(current: Versioned<Wallet>, amount: &ResourceBundle) -> WriteOp {
    let mut wallet = current.value;
    wallet.credit(amount);
    WriteOp::PutWallet {
        wallet,
        expected: current.version,
    }
}
