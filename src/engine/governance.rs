//! Owner-controlled setters. every change is validated before it is applied.

use super::core::Engine;
use super::results::ProtocolError;
use crate::config::ProtocolConfig;
use crate::events::{CircuitBreakerEvent, EventPayload};
use crate::guards::Operation;
use crate::services::Host;
use crate::types::{AccountId, ValidatorRef};
use log::{info, warn};

impl<H: Host> Engine<H> {
    /// Replace the whole protocol configuration.
    pub fn update_config(&mut self, caller: AccountId, config: ProtocolConfig) -> Result<(), ProtocolError> {
        self.transact("update_config", |engine| {
            engine.ensure_owner(caller)?;
            config.validate()?;
            engine.state.config = config;
            engine.emit(EventPayload::ConfigUpdated { by: caller });
            info!("config updated by {:?}", caller);
            Ok(())
        })
    }

    pub fn set_paused(&mut self, caller: AccountId, paused: bool) -> Result<(), ProtocolError> {
        self.transact("set_paused", |engine| {
            engine.ensure_owner(caller)?;
            engine.state.config.paused = paused;
            engine.emit(EventPayload::PauseChanged { paused });
            if paused {
                warn!("protocol paused by {:?}", caller);
            } else {
                info!("protocol unpaused by {:?}", caller);
            }
            Ok(())
        })
    }

    pub fn set_function_permission(
        &mut self,
        caller: AccountId,
        operation: Operation,
        enabled: bool,
    ) -> Result<(), ProtocolError> {
        self.transact("set_function_permission", |engine| {
            engine.ensure_owner(caller)?;
            engine.state.config.permissions.set(operation, enabled);
            engine.emit(EventPayload::PermissionChanged { operation, enabled });
            info!("{} {}", operation, if enabled { "enabled" } else { "disabled" });
            Ok(())
        })
    }

    /// Trip or reset the liquidity circuit breaker by hand.
    pub fn set_circuit_breaker(&mut self, caller: AccountId, active: bool) -> Result<(), ProtocolError> {
        self.transact("set_circuit_breaker", |engine| {
            engine.ensure_owner(caller)?;
            let reason = if active {
                let reason = format!("tripped by {:?}", caller);
                engine.state.liquidity.breaker.trip(engine.current_block, reason.clone());
                warn!("circuit breaker {}", reason);
                reason
            } else {
                engine.state.liquidity.breaker.reset();
                info!("circuit breaker reset by {:?}", caller);
                format!("reset by {:?}", caller)
            };
            engine.emit(EventPayload::CircuitBreakerChanged(CircuitBreakerEvent { active, reason }));
            Ok(())
        })
    }

    /// Link an account to the hotkey its contribution weight is reported under.
    pub fn associate_hotkey(&mut self, account: AccountId, hotkey: ValidatorRef) -> Result<(), ProtocolError> {
        self.transact("associate_hotkey", |engine| {
            if hotkey.is_unset() {
                return Err(ProtocolError::InvalidHotkey);
            }
            engine.state.hotkeys.insert(account, hotkey);
            engine.emit(EventPayload::HotkeyAssociated { account, hotkey });
            Ok(())
        })
    }
}
