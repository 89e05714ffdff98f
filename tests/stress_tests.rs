//! Stress tests
//!
//! These tests push the engine through crashes, batch scans, guardrails and
//! governance to verify it stays consistent under adverse conditions.

use leverage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const OWNER: AccountId = AccountId(1);
const LP: AccountId = AccountId(10);
const KEEPER: AccountId = AccountId(20);
const ASSET: AssetId = AssetId(1);
const CRASHING: AssetId = AssetId(2);

fn tao(v: Decimal) -> Amount {
    Amount::from_tao(v)
}

fn ratio(v: Decimal) -> Ratio {
    Ratio::from_decimal(v)
}

fn config() -> ProtocolConfig {
    let mut config = ProtocolConfig::with_owner(OWNER);
    config.trading_fee_rate = Ratio::ZERO;
    for (tier, leverage) in config.tiers.tiers.iter_mut().zip([5, 6, 7, 8, 9, 10]) {
        tier.max_leverage = Ratio::from_decimal(Decimal::from(leverage));
    }
    config
}

fn engine_with(config: ProtocolConfig, lp_tao: Decimal) -> Engine<MockHost> {
    let host = MockHost::new()
        .with_price_tao(ASSET, dec!(1))
        .with_price_tao(CRASHING, dec!(1))
        .with_price_tao(AssetId(0), dec!(1));
    let mut engine = Engine::new(config, host, EngineConfig::default()).unwrap();
    engine.add_liquidity(LP, tao(lp_tao)).unwrap();
    engine
}

fn open_on(engine: &mut Engine<MockHost>, user: AccountId, asset: AssetId, collateral: Decimal, leverage: Decimal) {
    engine
        .open_position(user, asset, tao(collateral), ratio(leverage), None, ratio(dec!(0.01)))
        .unwrap();
}

/// Batch scans and cascading liquidations.
mod cascade_tests {
    use super::*;

    #[test]
    fn batch_scan_returns_only_unhealthy_indices() {
        let mut cfg = config();
        cfg.liquidation_threshold = ratio(dec!(0.85));
        let mut engine = engine_with(cfg, dec!(1_000));

        let users: Vec<AccountId> = (100..105).map(AccountId).collect();
        let assets = vec![ASSET, CRASHING, ASSET, CRASHING, ASSET];
        for (user, asset) in users.iter().zip(&assets) {
            open_on(&mut engine, *user, *asset, dec!(10), dec!(5));
        }

        engine.host_mut().set_price_tao(CRASHING, dec!(0.64));
        assert_eq!(engine.find_liquidatable(&users, &assets).unwrap(), vec![1, 3]);
    }

    #[test]
    fn batch_scan_skips_inactive_and_unpriced() {
        let mut engine = engine_with(config(), dec!(1_000));
        open_on(&mut engine, AccountId(100), ASSET, dec!(10), dec!(5));
        open_on(&mut engine, AccountId(101), CRASHING, dec!(10), dec!(5));

        engine.host_mut().set_price_tao(ASSET, dec!(0.5));
        engine.host_mut().remove_price(CRASHING);

        let users = [AccountId(100), AccountId(101), AccountId(999)];
        let assets = [ASSET, CRASHING, ASSET];
        assert_eq!(engine.find_liquidatable(&users, &assets).unwrap(), vec![0]);
    }

    #[test]
    fn batch_scan_surfaces_accrual_overflow() {
        let host = MockHost::new().with_price_tao(ASSET, dec!(1));
        let mut engine = Engine::new(config(), host, EngineConfig::default()).unwrap();
        let whale = 6 * 10u128.pow(10) * WEI_PER_TAO;
        engine.add_liquidity(LP, Amount::new(whale)).unwrap();
        engine
            .open_position(AccountId(100), ASSET, Amount::new(whale / 2), ratio(dec!(2)), None, ratio(dec!(0.01)))
            .unwrap();

        // borrowed * rate * elapsed no longer fits in 128 bits
        engine.set_block(BlockNumber(1u64 << 62));
        assert_eq!(
            engine.find_liquidatable(&[AccountId(100)], &[ASSET]).unwrap_err(),
            ProtocolError::Math(MathError::Overflow)
        );
        // a clean pair ahead of it is no excuse to hide the failure
        assert!(engine
            .find_liquidatable(&[AccountId(999), AccountId(100)], &[ASSET, ASSET])
            .is_err());
    }

    #[test]
    fn batch_scan_rejects_mismatched_inputs() {
        let engine = engine_with(config(), dec!(100));
        let err = engine.find_liquidatable(&[AccountId(1), AccountId(2)], &[ASSET]).unwrap_err();
        assert_eq!(err, ProtocolError::ArrayLengthMismatch { users: 2, assets: 1 });
    }

    #[test]
    fn crash_cascade_clears_every_flagged_position() {
        let mut engine = engine_with(config(), dec!(10_000));

        let users: Vec<AccountId> = (100..150).map(AccountId).collect();
        for (i, user) in users.iter().enumerate() {
            let leverage = Decimal::from(1 + i as u64 % 5);
            open_on(&mut engine, *user, ASSET, dec!(20), leverage);
        }
        engine.advance_blocks(1_000);

        // 20% drop flags the 5x and 4x books under a 1.10 threshold
        engine.host_mut().set_price_tao(ASSET, dec!(0.8));
        let assets = vec![ASSET; users.len()];
        let flagged = engine.find_liquidatable(&users, &assets).unwrap();
        assert_eq!(flagged.len(), 20);

        for i in &flagged {
            let result = engine
                .liquidate_position(KEEPER, users[*i], ASSET, "ref", ContentHash::of(b"crash"))
                .unwrap();
            assert_eq!(
                result.debt_repaid.checked_add(result.fee_amount).unwrap().checked_add(result.returned_to_user).unwrap(),
                result.realized_value
            );
        }

        assert!(engine.find_liquidatable(&users, &assets).unwrap().is_empty());
        let stats = engine.stats();
        assert_eq!(stats.total_liquidations, 20);
        assert_eq!(stats.open_positions, 30);
        assert_eq!(stats.total_bad_debt, Amount::zero());
        assert!(!stats.circuit_breaker_active);
        assert_eq!(engine.liquidator(KEEPER).unwrap().score, 20);

        // the survivors close out and the books empty
        engine.host_mut().set_price_tao(ASSET, dec!(1));
        for (i, user) in users.iter().enumerate() {
            if !flagged.contains(&i) {
                engine.close_position(*user, ASSET).unwrap();
            }
        }
        let stats = engine.stats();
        assert_eq!(stats.open_positions, 0);
        assert_eq!(stats.total_borrowed, Amount::zero());
        assert_eq!(stats.total_collateral, Amount::zero());
        assert_eq!(engine.asset_pool(ASSET).unwrap().open_positions, 0);
    }

    #[test]
    fn liquidation_keeps_working_while_paused() {
        let mut engine = engine_with(config(), dec!(100));
        open_on(&mut engine, AccountId(100), ASSET, dec!(10), dec!(5));
        engine.set_paused(OWNER, true).unwrap();

        engine.advance_blocks(1);
        assert_eq!(
            engine.close_position(AccountId(100), ASSET).unwrap_err(),
            ProtocolError::ProtocolPaused
        );

        engine.host_mut().set_price_tao(ASSET, dec!(0.85));
        engine
            .liquidate_position(KEEPER, AccountId(100), ASSET, "ref", ContentHash::of(b"p"))
            .unwrap();
    }
}

/// Review requests and their expiry window.
mod request_tests {
    use super::*;

    #[test]
    fn request_expires_after_review_window() {
        let mut engine = engine_with(config(), dec!(100));
        let user = AccountId(100);
        open_on(&mut engine, user, ASSET, dec!(10), dec!(5));

        let id = engine
            .create_liquidation_request(KEEPER, user, ASSET, "ipfs://r", ContentHash::of(b"r"))
            .unwrap();
        let request = engine.request(&id).unwrap().clone();
        assert_eq!(request.deadline, BlockNumber(REVIEW_WINDOW_BLOCKS));
        assert_eq!(request.snapshot.borrowed, tao(dec!(40)));
        assert_eq!(id, RequestId::derive(KEEPER, user, ASSET, BlockNumber(0)));

        // the same requester cannot file twice in one block
        assert_eq!(
            engine
                .create_liquidation_request(KEEPER, user, ASSET, "ipfs://r", ContentHash::of(b"r"))
                .unwrap_err(),
            ProtocolError::DuplicateRequest
        );

        engine.host_mut().set_price_tao(ASSET, dec!(0.85));
        engine.advance_blocks(REVIEW_WINDOW_BLOCKS + 1);
        assert_eq!(
            engine.liquidate_from_request(KEEPER, id).unwrap_err(),
            ProtocolError::RequestExpired {
                deadline: BlockNumber(REVIEW_WINDOW_BLOCKS)
            }
        );

        // the position itself can still be liquidated directly
        engine
            .liquidate_position(KEEPER, user, ASSET, "ipfs://r2", ContentHash::of(b"r2"))
            .unwrap();
    }

    #[test]
    fn request_is_consumed_by_liquidation() {
        let mut engine = engine_with(config(), dec!(100));
        let user = AccountId(100);
        open_on(&mut engine, user, ASSET, dec!(10), dec!(5));

        let id = engine
            .create_liquidation_request(KEEPER, user, ASSET, "ipfs://r", ContentHash::of(b"r"))
            .unwrap();
        engine.host_mut().set_price_tao(ASSET, dec!(0.85));
        engine.advance_blocks(10);

        engine.liquidate_from_request(AccountId(21), id).unwrap();
        assert!(engine.request(&id).unwrap().is_processed);
        assert_eq!(
            engine.liquidate_from_request(AccountId(21), id).unwrap_err(),
            ProtocolError::RequestAlreadyProcessed
        );
    }

    #[test]
    fn request_needs_an_open_position() {
        let mut engine = engine_with(config(), dec!(100));
        let err = engine
            .create_liquidation_request(KEEPER, AccountId(100), ASSET, "ref", ContentHash::of(b"x"))
            .unwrap_err();
        assert_eq!(err, ProtocolError::PositionNotFound { user: AccountId(100), asset: ASSET });
        assert_eq!(
            engine.liquidate_from_request(KEEPER, RequestId([9u8; 32])).unwrap_err(),
            ProtocolError::RequestNotFound
        );
    }
}

/// Per-call guardrails: leverage, liquidity, cooldowns, permissions.
mod guardrail_tests {
    use super::*;

    #[test]
    fn leverage_capped_by_tier() {
        let mut engine = engine_with(ProtocolConfig::with_owner(OWNER), dec!(1_000));
        let err = engine
            .open_position(AccountId(100), ASSET, tao(dec!(10)), ratio(dec!(3)), None, ratio(dec!(0.01)))
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LeverageTooHigh {
                requested: ratio(dec!(3)),
                max: ratio(dec!(2)),
            }
        );
        assert_eq!(err.kind(), ErrorKind::Guardrail);
        assert_eq!(engine.tier_of(AccountId(100)).max_leverage, ratio(dec!(2)));
    }

    #[test]
    fn volume_unlocks_higher_tiers() {
        let mut cfg = ProtocolConfig::with_owner(OWNER);
        cfg.trading_fee_rate = Ratio::ZERO;
        let mut engine = engine_with(cfg, dec!(10_000));
        let user = AccountId(100);

        open_on(&mut engine, user, ASSET, dec!(50), dec!(2));
        engine.advance_blocks(1);
        engine.close_position(user, ASSET).unwrap();
        // 100 notional in, 100 proceeds out
        assert_eq!(engine.account_volume(user), tao(dec!(200)));
        assert_eq!(engine.tier_of(user).max_leverage, ratio(dec!(3)));

        engine.advance_blocks(1);
        open_on(&mut engine, user, ASSET, dec!(10), dec!(3));
    }

    #[test]
    fn borrowing_limited_by_utilization_cap() {
        let mut engine = engine_with(config(), dec!(100));
        open_on(&mut engine, AccountId(100), ASSET, dec!(20), dec!(5));
        assert_eq!(engine.utilization(), ratio(dec!(0.8)));

        let err = engine
            .open_position(AccountId(101), ASSET, tao(dec!(10)), ratio(dec!(3)), None, ratio(dec!(0.01)))
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientLiquidity {
                requested: tao(dec!(20)),
                available: tao(dec!(10)),
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn no_lending_from_a_thin_pool() {
        let mut engine = engine_with(config(), dec!(5));
        let err = engine
            .open_position(AccountId(100), ASSET, tao(dec!(1)), ratio(dec!(2)), None, ratio(dec!(0.01)))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn lp_withdrawal_guards() {
        let mut engine = engine_with(config(), dec!(100));
        open_on(&mut engine, AccountId(100), ASSET, dec!(20), dec!(5));

        // LP cooldown first
        assert_eq!(
            engine.remove_liquidity(LP, tao(dec!(1))).unwrap_err(),
            ProtocolError::LpCooldownActive { until: BlockNumber(10) }
        );
        engine.advance_blocks(10);

        // 80 borrowed against 80 left would be 100% utilized
        assert!(matches!(
            engine.remove_liquidity(LP, tao(dec!(20))).unwrap_err(),
            ProtocolError::UtilizationExceeded { .. }
        ));
        assert!(matches!(
            engine.remove_liquidity(LP, tao(dec!(200))).unwrap_err(),
            ProtocolError::InsufficientLpStake { .. }
        ));
        assert_eq!(
            engine.remove_liquidity(AccountId(99), tao(dec!(1))).unwrap_err(),
            ProtocolError::LpNotFound(AccountId(99))
        );
        assert!(matches!(
            engine.add_liquidity(AccountId(11), tao(dec!(0.5))).unwrap_err(),
            ProtocolError::LpMinDeposit { .. }
        ));

        engine.remove_liquidity(LP, tao(dec!(10))).unwrap();
    }

    #[test]
    fn pool_cannot_be_drained_below_floor() {
        let mut engine = engine_with(config(), dec!(100));
        engine.advance_blocks(10);
        assert!(matches!(
            engine.remove_liquidity(LP, tao(dec!(95))).unwrap_err(),
            ProtocolError::LiquidityBelowThreshold { .. }
        ));
        // a full exit is allowed
        engine.remove_liquidity(LP, tao(dec!(100))).unwrap();
        assert_eq!(engine.stats().total_lp_stakes, Amount::zero());
    }

    #[test]
    fn user_cooldown_blocks_same_block_repeat() {
        let mut engine = engine_with(config(), dec!(100));
        let user = AccountId(100);
        open_on(&mut engine, user, ASSET, dec!(10), dec!(2));

        let err = engine.close_position(user, ASSET).unwrap_err();
        assert_eq!(err, ProtocolError::UserCooldownActive { until: BlockNumber(1) });
        assert!(err.is_retryable());

        engine.advance_blocks(1);
        engine.close_position(user, ASSET).unwrap();
    }

    #[test]
    fn disabled_operation_is_refused() {
        let mut engine = engine_with(config(), dec!(100));
        assert_eq!(
            engine
                .set_function_permission(AccountId(2), Operation::OpenPosition, false)
                .unwrap_err(),
            ProtocolError::Unauthorized(AccountId(2))
        );
        engine.set_function_permission(OWNER, Operation::OpenPosition, false).unwrap();
        assert!(!engine.is_permitted(Operation::OpenPosition));

        let err = engine
            .open_position(AccountId(100), ASSET, tao(dec!(10)), ratio(dec!(2)), None, ratio(dec!(0.01)))
            .unwrap_err();
        assert_eq!(err, ProtocolError::FunctionNotPermitted(Operation::OpenPosition));
        assert_eq!(err.kind(), ErrorKind::Permission);

        engine.set_function_permission(OWNER, Operation::OpenPosition, true).unwrap();
        open_on(&mut engine, AccountId(100), ASSET, dec!(10), dec!(2));
    }

    #[test]
    fn missing_price_is_invalid() {
        let mut engine = engine_with(config(), dec!(100));
        let err = engine
            .open_position(AccountId(100), AssetId(42), tao(dec!(10)), ratio(dec!(2)), None, ratio(dec!(0.01)))
            .unwrap_err();
        assert_eq!(err, ProtocolError::InvalidAlphaPrice(AssetId(42)));
    }

    #[test]
    fn stake_routes_through_named_validator() {
        let mut engine = engine_with(config(), dec!(100));
        let validator = ValidatorRef::new([7u8; 32]);
        engine
            .open_position(AccountId(100), ASSET, tao(dec!(10)), ratio(dec!(2)), Some(validator), ratio(dec!(0.01)))
            .unwrap();
        assert_eq!(engine.host().staked(validator, ASSET), AlphaAmount::new(20 * ALPHA_UNIT));

        engine.advance_blocks(1);
        engine.close_position(AccountId(100), ASSET).unwrap();
        assert_eq!(engine.host().staked(validator, ASSET), AlphaAmount::zero());
    }
}

/// Rewards, buybacks, weights and governance.
mod economics_tests {
    use super::*;

    #[test]
    fn lp_and_liquidator_rewards_are_claimable() {
        let mut cfg = config();
        cfg.trading_fee_rate = ratio(dec!(0.003));
        let mut engine = engine_with(cfg, dec!(1_000));

        assert_eq!(engine.claim_lp_rewards(LP).unwrap_err(), ProtocolError::NothingToClaim);

        open_on(&mut engine, AccountId(100), ASSET, dec!(10), dec!(5));
        open_on(&mut engine, AccountId(101), ASSET, dec!(10), dec!(2));
        engine.advance_blocks(720);

        engine.host_mut().set_price_tao(ASSET, dec!(0.85));
        engine
            .liquidate_position(KEEPER, AccountId(100), ASSET, "ref", ContentHash::of(b"k"))
            .unwrap();

        // keeper holds the only liquidator shares when this close pays fees
        engine.host_mut().set_price_tao(ASSET, dec!(1));
        engine.close_position(AccountId(101), ASSET).unwrap();

        let pending_lp = engine.pending_lp_rewards(LP).unwrap();
        assert!(!pending_lp.is_zero());
        assert_eq!(engine.claim_lp_rewards(LP).unwrap(), pending_lp);
        assert_eq!(engine.pending_lp_rewards(LP).unwrap(), Amount::zero());

        let pending_keeper = engine.pending_liquidator_rewards(KEEPER).unwrap();
        assert!(!pending_keeper.is_zero());
        let keeper_before = engine.host().balance(KEEPER);
        assert_eq!(engine.claim_liquidator_rewards(KEEPER).unwrap(), pending_keeper);
        assert_eq!(
            engine.host().balance(KEEPER),
            keeper_before.checked_add(pending_keeper).unwrap()
        );
    }

    #[test]
    fn buyback_respects_threshold_interval_and_managers() {
        let mut cfg = config();
        cfg.managers.push(AccountId(2));
        cfg.buyback.execution_threshold = tao(dec!(0.01));
        let mut engine = engine_with(cfg, dec!(100));

        assert_eq!(
            engine.execute_buyback(OWNER).unwrap_err(),
            ProtocolError::BuybackConditionsNotMet
        );

        // one liquidation feeds 0.05 into the pool
        open_on(&mut engine, AccountId(100), ASSET, dec!(10), dec!(5));
        engine.host_mut().set_price_tao(ASSET, dec!(0.64));
        engine.host_mut().set_redeem_override(Some(Rao::new(45 * RAO_PER_TAO)));
        engine
            .liquidate_position(KEEPER, AccountId(100), ASSET, "ref", ContentHash::of(b"b"))
            .unwrap();
        assert_eq!(engine.buyback().pool, tao(dec!(0.05)));

        assert_eq!(
            engine.execute_buyback(KEEPER).unwrap_err(),
            ProtocolError::Unauthorized(KEEPER)
        );
        let record = engine.execute_buyback(AccountId(2)).unwrap();
        assert_eq!(record.spent, tao(dec!(0.025)));
        assert_eq!(record.alpha_bought, AlphaAmount::new(25_000_000));
        assert_eq!(engine.buyback().pool, tao(dec!(0.025)));

        // pool still above threshold but the interval has not passed
        assert_eq!(
            engine.execute_buyback(OWNER).unwrap_err(),
            ProtocolError::BuybackConditionsNotMet
        );
        engine.advance_blocks(engine.config().buyback.interval_blocks);
        engine.execute_buyback(OWNER).unwrap();
        assert_eq!(engine.buyback().executions, 2);
    }

    #[test]
    fn contribution_weights_sum_to_one() {
        let mut engine = engine_with(config(), dec!(300));
        engine.add_liquidity(AccountId(11), tao(dec!(100))).unwrap();

        assert_eq!(
            engine.associate_hotkey(LP, ValidatorRef::UNSET).unwrap_err(),
            ProtocolError::InvalidHotkey
        );
        engine.associate_hotkey(LP, ValidatorRef::new([1u8; 32])).unwrap();
        engine.associate_hotkey(AccountId(11), ValidatorRef::new([2u8; 32])).unwrap();
        engine.associate_hotkey(KEEPER, ValidatorRef::new([3u8; 32])).unwrap();

        let weights = engine.contribution_weights();
        assert_eq!(weights.len(), 3);
        let total: Decimal = weights.iter().map(|w| w.weight).sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));

        // 0.7 * 300 vs 0.7 * 100, the keeper has no score yet
        assert_eq!(weights[0].account, LP);
        assert!((weights[0].weight - dec!(0.75)).abs() < dec!(0.000001));
        assert_eq!(weights[2].account, KEEPER);
        assert_eq!(weights[2].weight, Decimal::ZERO);
        assert_eq!(engine.hotkey(LP), Some(ValidatorRef::new([1u8; 32])));
    }

    #[test]
    fn config_update_is_validated_and_owner_only() {
        let mut engine = engine_with(config(), dec!(100));

        let mut next = engine.config().clone();
        next.liquidation_threshold = ratio(dec!(1.2));
        assert_eq!(
            engine.update_config(KEEPER, next.clone()).unwrap_err(),
            ProtocolError::Unauthorized(KEEPER)
        );

        let mut broken = next.clone();
        broken.fee_schedule.trading.lp_share = ratio(dec!(0.9));
        assert!(matches!(
            engine.update_config(OWNER, broken).unwrap_err(),
            ProtocolError::Config(ConfigError::DistributionInvalid { .. })
        ));
        assert_eq!(engine.config().liquidation_threshold, ratio(dec!(1.1)));

        engine.update_config(OWNER, next).unwrap();
        assert_eq!(engine.config().liquidation_threshold, ratio(dec!(1.2)));
        assert!(matches!(
            engine.events().last().unwrap().payload,
            EventPayload::ConfigUpdated { by: OWNER }
        ));
    }

    #[test]
    fn event_buffer_is_bounded() {
        let host = MockHost::new().with_price_tao(ASSET, dec!(1));
        let engine_config = EngineConfig {
            max_events: 5,
            log_events: true,
        };
        let mut engine = Engine::new(config(), host, engine_config).unwrap();

        for n in 0..10u64 {
            engine.add_liquidity(AccountId(100 + n), tao(dec!(10))).unwrap();
        }
        let events = engine.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events.first().unwrap().id, EventId(6));
        assert_eq!(events.last().unwrap().id, EventId(10));
    }
}
