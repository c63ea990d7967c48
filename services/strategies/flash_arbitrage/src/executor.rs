//! # Flash Arbitrage Executor - Atomic Execution Plans
//!
//! ## Purpose
//!
//! Turns a re-validated path and a chosen capital source into the exact call the
//! on-chain executor contract runs: borrow, swap hop by hop with a minimum output per
//! hop, repay, keep the rest. Every guard the contract enforces is computed here from the
//! validated path so a plan that would revert is rejected before it is ever signed.
//!
//! ## Guards
//!
//! ```text
//! hop min out   = expected out × (10 000 − slippage buffer) / 10 000
//! final min out = max(last hop min out, principal + loan fee)
//! deadline      = now + deadline_secs
//! ```
//!
//! ## Architecture Role
//!
//! ```text
//! CandidatePath + CapitalQuote ──► [PlanBuilder] ──► ArbParams::validate ──► calldata
//!                                                                              │
//!                                           orchestrator signs and bundles ◄───┘
//! ```

use ethers::abi::{self, Token};
use ethers::utils::id;
use serde::Serialize;
use types::{Address, Bytes, CandidatePath, VenueProtocol, BPS, U256, U512};
use uuid::Uuid;

use crate::capital::CapitalQuote;
use crate::config::{ExecutionConfig, ProviderKind};
use crate::error::{StrategyError, StrategyResult};
use crate::profit::ProfitModel;

/// Executor contract entry point; returns the final output of the last step as `uint256`
pub const EXECUTE_ARBITRAGE: &str = "executeArbitrage(uint8,address,address,uint256,(address,address,address,bool,uint8,uint256,uint256)[],uint256,uint256,uint256)";

/// One swap as the executor contract performs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopInstruction {
    pub venue: Address,
    pub protocol: VenueProtocol,
    pub asset_in: Address,
    pub asset_out: Address,
    pub zero_for_one: bool,
    pub amount_in: U256,
    pub min_amount_out: U256,
}

impl HopInstruction {
    fn token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.venue),
            Token::Address(self.asset_in),
            Token::Address(self.asset_out),
            Token::Bool(self.zero_for_one),
            Token::Uint(U256::from(self.protocol.executor_id())),
            Token::Uint(self.amount_in),
            Token::Uint(self.min_amount_out),
        ])
    }
}

/// Arguments of one `executeArbitrage` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbParams {
    pub provider_kind: ProviderKind,
    pub loan_pool: Address,
    pub loan_asset: Address,
    pub loan_amount: U256,
    pub steps: Vec<HopInstruction>,
    /// Principal plus loan fee; the final step must return at least this much
    pub min_repayment: U256,
    pub expected_profit: U256,
    /// Unix seconds
    pub deadline: u64,
}

impl ArbParams {
    /// Reject parameters the contract would revert on
    pub fn validate(&self, now_secs: u64) -> StrategyResult<()> {
        if self.loan_amount.is_zero() {
            return Err(StrategyError::invalid_params("loan amount is zero"));
        }
        if self.loan_pool.is_zero() {
            return Err(StrategyError::invalid_params("loan pool is the zero address"));
        }
        if self.expected_profit.is_zero() {
            return Err(StrategyError::invalid_params("expected profit is zero"));
        }
        if self.deadline <= now_secs {
            return Err(StrategyError::invalid_params(format!(
                "deadline {} is not after {}",
                self.deadline, now_secs
            )));
        }
        let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) else {
            return Err(StrategyError::invalid_params("no swap steps"));
        };
        if first.asset_in != self.loan_asset {
            return Err(StrategyError::invalid_params("first step does not spend the borrowed asset"));
        }
        if last.asset_out != self.loan_asset {
            return Err(StrategyError::invalid_params("last step does not return the borrowed asset"));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.amount_in.is_zero() || step.min_amount_out.is_zero() {
                return Err(StrategyError::invalid_params(format!("step {index} has a zero amount")));
            }
            if let Some(next) = self.steps.get(index + 1) {
                if step.asset_out != next.asset_in {
                    return Err(StrategyError::invalid_params(format!(
                        "asset mismatch between steps {index} and {}",
                        index + 1
                    )));
                }
            }
        }
        if self.min_repayment < self.loan_amount {
            return Err(StrategyError::invalid_params("repayment is below the principal"));
        }
        if last.min_amount_out < self.min_repayment {
            return Err(StrategyError::invalid_params("final minimum does not cover repayment"));
        }
        Ok(())
    }

    /// ABI-encoded call, selector included
    pub fn calldata(&self) -> Bytes {
        let steps = self.steps.iter().map(HopInstruction::token).collect();
        let encoded = abi::encode(&[
            Token::Uint(U256::from(self.provider_kind.id())),
            Token::Address(self.loan_pool),
            Token::Address(self.loan_asset),
            Token::Uint(self.loan_amount),
            Token::Array(steps),
            Token::Uint(self.min_repayment),
            Token::Uint(self.expected_profit),
            Token::Uint(U256::from(self.deadline)),
        ]);
        let mut calldata = id(EXECUTE_ARBITRAGE).to_vec();
        calldata.extend_from_slice(&encoded);
        Bytes::from(calldata)
    }
}

/// A validated, ready-to-sign execution
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub opportunity_id: Uuid,
    pub params: ArbParams,
    pub provider: String,
    pub loan_fee: U256,
    pub to: Address,
    pub calldata: Bytes,
    pub gas_limit: u64,
}

#[derive(Debug, Clone)]
pub struct PlanBuilder {
    config: ExecutionConfig,
    profit: ProfitModel,
}

impl PlanBuilder {
    pub fn new(config: ExecutionConfig, profit: ProfitModel) -> Self {
        Self { config, profit }
    }

    /// Expected output less the slippage buffer, rounded down
    pub fn min_out(&self, expected: U256) -> U256 {
        let keep = BPS.saturating_sub(self.config.slippage_buffer_bps.min(BPS));
        let scaled = expected.full_mul(U256::from(keep)) / U512::from(BPS);
        U256::try_from(scaled).unwrap_or(U256::MAX)
    }

    pub fn build(
        &self,
        opportunity_id: Uuid,
        path: &CandidatePath,
        capital: &CapitalQuote,
        now_secs: u64,
    ) -> StrategyResult<ExecutionPlan> {
        let principal = path.amount_in;
        if !self
            .profit
            .is_repayable(path.gross_output, principal, capital.fee)
        {
            return Err(StrategyError::invalid_params(format!(
                "output {} cannot repay {} plus fee {}",
                path.gross_output, principal, capital.fee
            )));
        }
        if !path.is_profitable() {
            return Err(StrategyError::invalid_params("path is not profitable"));
        }
        let min_repayment = principal.saturating_add(capital.fee);

        let mut steps: Vec<HopInstruction> = path
            .hops
            .iter()
            .map(|hop| HopInstruction {
                venue: hop.venue,
                protocol: hop.protocol,
                asset_in: hop.asset_in,
                asset_out: hop.asset_out,
                zero_for_one: hop.direction == types::Direction::ZeroForOne,
                amount_in: hop.amount_in,
                min_amount_out: self.min_out(hop.amount_out),
            })
            .collect();
        if let Some(last) = steps.last_mut() {
            last.min_amount_out = last.min_amount_out.max(min_repayment);
        }

        let gas_limit = self.profit.gas_units(&path.hops, true);
        if gas_limit > self.config.max_gas_limit {
            return Err(StrategyError::invalid_params(format!(
                "gas limit {gas_limit} exceeds {}",
                self.config.max_gas_limit
            )));
        }

        let params = ArbParams {
            provider_kind: capital.descriptor.kind,
            loan_pool: capital.descriptor.callback_contract,
            loan_asset: path.start_asset(),
            loan_amount: principal,
            steps,
            min_repayment,
            expected_profit: path.net_profit.unsigned_abs(),
            deadline: now_secs.saturating_add(self.config.deadline_secs),
        };
        params.validate(now_secs)?;

        Ok(ExecutionPlan {
            opportunity_id,
            calldata: params.calldata(),
            params,
            provider: capital.descriptor.provider.clone(),
            loan_fee: capital.fee,
            to: self.config.executor_contract,
            gas_limit,
        })
    }
}
