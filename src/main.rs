//! Leveraged staking protocol simulation.
//!
//! Walks the engine through its lifecycle: LP funding, leveraged opens and
//! closes, a price crash with liquidations, review requests, fee claims,
//! buybacks and a bad-debt circuit breaker trip.

use leverage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const OWNER: AccountId = AccountId(1);
const LP: AccountId = AccountId(10);
const KEEPER: AccountId = AccountId(20);
const SUBNET: AssetId = AssetId(7);

fn main() {
    env_logger::init();

    println!("Leveraged Staking Protocol Simulation");
    println!("LP-backed borrowing, dynamic rates, liquidation waterfall\n");

    scenario_1_open_and_close();
    scenario_2_price_crash_liquidation();
    scenario_3_review_requests();
    scenario_4_fees_and_buyback();
    scenario_5_bad_debt_breaker();

    println!("\nAll simulations completed successfully.");
}

fn tao(v: Decimal) -> Amount {
    Amount::from_tao(v)
}

fn ratio(v: Decimal) -> Ratio {
    Ratio::from_decimal(v)
}

/// Default config with a 5x entry tier so the scenarios can lever up immediately.
fn sim_config() -> ProtocolConfig {
    let mut config = ProtocolConfig::with_owner(OWNER);
    for (tier, leverage) in config.tiers.tiers.iter_mut().zip([5, 6, 7, 8, 9, 10]) {
        tier.max_leverage = Ratio::from_decimal(Decimal::from(leverage));
    }
    config.buyback.asset = SUBNET;
    config.buyback.execution_threshold = tao(dec!(0.01));
    config
}

fn new_engine(config: ProtocolConfig) -> Engine<MockHost> {
    let host = MockHost::new()
        .with_price_tao(SUBNET, dec!(1))
        .with_price_tao(AssetId(0), dec!(1));
    Engine::new(config, host, EngineConfig::default()).unwrap()
}

/// Fund the pool, open a 3x position, let fees accrue, close it.
fn scenario_1_open_and_close() {
    println!("Scenario 1: Open and Close\n");

    let mut engine = new_engine(sim_config());
    let trader = AccountId(100);

    engine.add_liquidity(LP, tao(dec!(1_000))).unwrap();
    println!("  LP deposits 1,000 TAO");

    let id = engine
        .open_position(trader, SUBNET, tao(dec!(10)), ratio(dec!(3)), None, ratio(dec!(0.01)))
        .unwrap();
    let pos = engine.position(trader, SUBNET).unwrap().clone();
    println!("  Position {} opened: {} collateral, {} borrowed, {}", id.0, pos.collateral, pos.borrowed, pos.asset_amount);
    println!("  Pool utilization: {}", engine.utilization());
    println!("  Borrow rate per 360 blocks: {}", engine.borrow_rate(SUBNET).unwrap());

    engine.advance_blocks(720);
    println!("  After 720 blocks, accrued fees: {}", engine.accrued_fees(trader, SUBNET).unwrap());

    let closed = engine.close_position(trader, SUBNET).unwrap();
    println!(
        "  Closed: proceeds {}, debt repaid {}, trading fee {}, returned {}\n",
        closed.proceeds, closed.debt_repaid, closed.trading_fee, closed.returned
    );
}

/// Price drops 18%. the keeper scans and liquidates everything below the threshold.
fn scenario_2_price_crash_liquidation() {
    println!("Scenario 2: Price Crash Liquidation\n");

    let mut engine = new_engine(sim_config());
    engine.add_liquidity(LP, tao(dec!(1_000))).unwrap();

    let traders: Vec<AccountId> = (200..205).map(AccountId).collect();
    for (i, trader) in traders.iter().enumerate() {
        let leverage = Decimal::from(2 + i as u64 % 4);
        engine
            .open_position(*trader, SUBNET, tao(dec!(10)), ratio(leverage), None, ratio(dec!(0.01)))
            .unwrap();
        println!("  {:?} opens 10 TAO at {}x", trader, leverage);
    }

    engine.host_mut().set_price_tao(SUBNET, dec!(0.82));
    println!("\n  Price drops from 1.00 to 0.82");

    let assets = vec![SUBNET; traders.len()];
    let flagged = engine.find_liquidatable(&traders, &assets).unwrap();
    println!("  Liquidatable indices: {:?}", flagged);

    for i in flagged {
        let result = engine
            .liquidate_position(KEEPER, traders[i], SUBNET, "ipfs://price-crash", ContentHash::of(b"price-crash"))
            .unwrap();
        println!(
            "  Liquidated {:?}: health {}, realized {}, fee {}, returned {}",
            result.user, result.health_ratio, result.realized_value, result.fee_amount, result.returned_to_user
        );
    }

    let stats = engine.stats();
    println!("  Liquidations: {}, bad debt: {}\n", stats.total_liquidations, stats.total_bad_debt);
}

/// An advisory review request, then a liquidation that consumes it.
fn scenario_3_review_requests() {
    println!("Scenario 3: Review Requests\n");

    let mut engine = new_engine(sim_config());
    let trader = AccountId(300);

    engine.add_liquidity(LP, tao(dec!(500))).unwrap();
    engine
        .open_position(trader, SUBNET, tao(dec!(10)), ratio(dec!(5)), None, ratio(dec!(0.01)))
        .unwrap();
    engine.host_mut().set_price_tao(SUBNET, dec!(0.85));

    let evidence = b"subnet emissions halted";
    let request_id = engine
        .create_liquidation_request(KEEPER, trader, SUBNET, "ipfs://review", ContentHash::of(evidence))
        .unwrap();
    let request = engine.request(&request_id).unwrap().clone();
    println!("  Request {} filed, deadline {}", request_id, request.deadline);

    engine.advance_blocks(100);
    let result = engine.liquidate_from_request(KEEPER, request_id).unwrap();
    println!("  Liquidated from request: realized {}, debt repaid {}", result.realized_value, result.debt_repaid);
    println!("  Request processed: {}\n", engine.request(&request_id).unwrap().is_processed);
}

/// Trading and borrowing fees flow to LPs, liquidators and the buyback pool.
fn scenario_4_fees_and_buyback() {
    println!("Scenario 4: Fee Distribution and Buyback\n");

    let mut engine = new_engine(sim_config());

    engine.add_liquidity(LP, tao(dec!(1_000))).unwrap();
    engine.associate_hotkey(LP, ValidatorRef::new([0xaa; 32])).unwrap();
    engine.associate_hotkey(KEEPER, ValidatorRef::new([0xbb; 32])).unwrap();

    for n in 0..10u64 {
        let trader = AccountId(400 + n);
        engine
            .open_position(trader, SUBNET, tao(dec!(20)), ratio(dec!(4)), None, ratio(dec!(0.01)))
            .unwrap();
    }
    engine.advance_blocks(3_600);

    engine.host_mut().set_price_tao(SUBNET, dec!(0.78));
    let liquidated = engine
        .liquidate_position(KEEPER, AccountId(400), SUBNET, "ipfs://fees", ContentHash::of(b"fees"))
        .unwrap();
    println!("  Keeper liquidates one position, fee share {}", liquidated.liquidator_share);

    engine.host_mut().set_price_tao(SUBNET, dec!(1.1));
    for n in 1..10u64 {
        engine.close_position(AccountId(400 + n), SUBNET).unwrap();
    }

    let fees = engine.fee_distributor();
    println!(
        "  Fees collected: trading {}, borrowing {}, liquidation {}",
        fees.collected.trading, fees.collected.borrowing, fees.collected.liquidation
    );

    let lp_rewards = engine.claim_lp_rewards(LP).unwrap();
    println!("  LP claims {}", lp_rewards);
    let keeper_rewards = engine.claim_liquidator_rewards(KEEPER).unwrap();
    println!("  Keeper claims {}", keeper_rewards);

    for weight in engine.contribution_weights() {
        println!("  Weight of {:?} ({}): {}", weight.account, weight.hotkey, weight.weight.round_dp(4));
    }

    println!("  Buyback pool: {}", engine.buyback().pool);
    let record = engine.execute_buyback(OWNER).unwrap();
    println!("  Buyback spent {} for {}\n", record.spent, record.alpha_bought);
}

/// Proceeds below principal leave bad debt and trip the circuit breaker.
fn scenario_5_bad_debt_breaker() {
    println!("Scenario 5: Bad Debt and Circuit Breaker\n");

    let mut config = sim_config();
    config.liquidation_threshold = ratio(dec!(0.85));
    let mut engine = new_engine(config);
    let trader = AccountId(500);

    engine.add_liquidity(LP, tao(dec!(200))).unwrap();
    engine
        .open_position(trader, SUBNET, tao(dec!(10)), ratio(dec!(5)), None, ratio(dec!(0.01)))
        .unwrap();

    engine.host_mut().set_price_tao(SUBNET, dec!(0.3));
    let result = engine
        .liquidate_position(KEEPER, trader, SUBNET, "ipfs://gap", ContentHash::of(b"gap"))
        .unwrap();
    println!("  Realized {} against {} debt, bad debt {}", result.realized_value, result.total_debt, result.bad_debt);
    println!("  Circuit breaker active: {}", engine.circuit_breaker_active());
    println!("  LP claim written down to {}", engine.lp_value(LP).unwrap());

    engine.advance_blocks(10);
    match engine.open_position(AccountId(501), SUBNET, tao(dec!(10)), ratio(dec!(2)), None, ratio(dec!(0.01))) {
        Ok(_) => println!("  Unexpected: open succeeded"),
        Err(e) => println!("  New open refused: {} (retryable: {})", e, e.is_retryable()),
    }
    match engine.remove_liquidity(LP, tao(dec!(50))) {
        Ok(_) => println!("  Unexpected: withdrawal succeeded"),
        Err(e) => println!("  LP withdrawal refused: {}", e),
    }

    engine.set_circuit_breaker(OWNER, false).unwrap();
    engine.remove_liquidity(LP, tao(dec!(50))).unwrap();
    println!("  Owner resets the breaker, LP withdraws 50 TAO");
}
