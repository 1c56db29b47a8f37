pub mod ai;
pub mod game;
pub mod logging;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    AgentConfig, Difficulty, GameAdapter, MctsAgent, SearchDecision, SearchMode, TurnController,
    TurnOutcome, TurnReport, TurnStep,
};
pub use game::{
    DuelAdapter, DuelMove, DuelState, GameEvent, PlayerId, RuleEngine, RuleError, RuleResolution,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

/// 无法识别的难度名退回 balanced。
fn parse_difficulty(value: Option<&str>) -> Difficulty {
    value
        .and_then(|value| Difficulty::from_str(value).ok())
        .unwrap_or(Difficulty::Balanced)
}

fn adapter_for(state: DuelState, difficulty: Option<&str>) -> DuelAdapter {
    DuelAdapter::new(state, parse_difficulty(difficulty))
}

/// 难度以适配器为准，`mode` 无法识别时保持 adaptive。
fn agent_config(adapter: &DuelAdapter, mode: Option<&str>) -> AgentConfig {
    let config = AgentConfig::for_adapter(adapter);
    match mode.and_then(|value| SearchMode::from_str(value).ok()) {
        Some(mode) => config.with_mode(mode),
        None => config,
    }
}

fn new_state(seed: Option<u32>) -> DuelState {
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(u64::from(seed)),
        None => SmallRng::from_entropy(),
    };
    DuelState::shuffled(&mut rng)
}

fn legal_moves_for(state: &DuelState, player_id: PlayerId) -> Vec<DuelMove> {
    if state.current_player != player_id || state.is_finished() {
        return Vec::new();
    }
    RuleEngine::new().legal_moves(state)
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: SearchDecision<DuelMove>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

#[derive(Serialize)]
struct AiTurnResponse {
    report: TurnReport<DuelMove>,
    state: DuelState,
}

#[wasm_bindgen]
pub struct DuelEngine {
    state: DuelState,
    seed: Option<u64>,
    decisions: u64,
}

impl DuelEngine {
    /// 带种子创建时，每次决策使用递增的派生种子，整局可复现。
    fn make_agent(&mut self, config: AgentConfig) -> MctsAgent<DuelAdapter> {
        self.decisions += 1;
        match self.seed {
            Some(seed) => MctsAgent::with_seed(config, seed.wrapping_add(self.decisions)),
            None => MctsAgent::new(config),
        }
    }
}

#[wasm_bindgen]
impl DuelEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>, seed: Option<u32>) -> Result<DuelEngine, JsValue> {
        let state = match initial_state_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => new_state(seed),
        };
        Ok(DuelEngine {
            state,
            seed: seed.map(u64::from),
            decisions: 0,
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(&self.state)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: DuelState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        self.state = state;
        Ok(())
    }

    pub fn legal_moves_json(&self, player_id: u8) -> Result<String, JsValue> {
        to_json(&legal_moves_for(&self.state, player_id))
    }

    pub fn apply_move_json(&mut self, player_id: u8, move_json: &str) -> Result<String, JsValue> {
        let action: DuelMove = serde_json::from_str(move_json).map_err(serde_to_js_error)?;
        let resolution = RuleEngine::new()
            .resolve(&self.state, player_id, &action)
            .map_err(to_js_error)?;
        self.state = resolution.state.clone();
        to_json(&resolution)
    }

    /// 决策并立即提交一个动作。
    pub fn apply_ai_move(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        mode: Option<String>,
    ) -> Result<String, JsValue> {
        let adapter = adapter_for(self.state.clone(), difficulty.as_deref());
        let config = agent_config(&adapter, mode.as_deref());
        let decision = self.make_agent(config).decide(&adapter, player_id);

        let applied = match decision.action {
            Some(action) => {
                let resolution = RuleEngine::new()
                    .resolve(&self.state, player_id, &action)
                    .map_err(to_js_error)?;
                self.state = resolution.state.clone();
                Some(resolution)
            }
            None => None,
        };
        to_json(&AiMoveResponse { decision, applied })
    }

    /// 延迟 `delay_ms` 后决策，只返回决策，不修改状态。
    pub fn think_ai(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        mode: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        let adapter = adapter_for(self.state.clone(), difficulty.as_deref());
        let config = agent_config(&adapter, mode.as_deref());
        let mut agent = self.make_agent(config);
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let decision = agent.decide(&adapter, player_id);
            let json = to_json(&decision)?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// 由 AI 下完整个回合。
    pub fn play_ai_turn(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        mode: Option<String>,
    ) -> Result<String, JsValue> {
        let mut adapter = adapter_for(self.state.clone(), difficulty.as_deref());
        let config = agent_config(&adapter, mode.as_deref());
        let mut turn = TurnController::new(self.make_agent(config), player_id);
        let report = turn.play_turn(&mut adapter);
        self.state = adapter.into_state();
        to_json(&AiTurnResponse {
            report,
            state: self.state.clone(),
        })
    }

    /// 每步之间暂停 `delay_ms`。在副本上进行，宿主用返回的状态调用 `set_state_json`。
    pub fn play_ai_turn_paced(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        mode: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        let mut adapter = adapter_for(self.state.clone(), difficulty.as_deref());
        let config = agent_config(&adapter, mode.as_deref());
        let mut turn = TurnController::new(self.make_agent(config), player_id);
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            let start = ai::clock::SearchInstant::now();
            turn.begin_turn();
            let mut actions = Vec::new();
            let outcome = loop {
                if delay > 0 {
                    TimeoutFuture::new(delay).await;
                }
                match turn.step(&mut adapter) {
                    TurnStep::Continue { action } => actions.push(action),
                    TurnStep::Done { outcome, action } => {
                        actions.extend(action);
                        break outcome;
                    }
                }
            };
            let (decisions, iterations) = turn.totals();
            let report = TurnReport {
                outcome,
                actions,
                decisions,
                iterations,
                elapsed_ms: start.elapsed_ms(),
            };
            let json = to_json(&AiTurnResponse {
                report,
                state: adapter.into_state(),
            })?;
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 创建一局新的洗好牌的对局。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(seed: Option<u32>) -> Result<JsValue, JsValue> {
    to_value(&new_state(seed)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "legalMoves")]
pub fn legal_moves(state: JsValue, player_id: u8) -> Result<JsValue, JsValue> {
    let state: DuelState = from_value(state).map_err(JsValue::from)?;
    to_value(&legal_moves_for(&state, player_id)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "applyMove")]
pub fn apply_move(state: JsValue, player_id: u8, action: JsValue) -> Result<JsValue, JsValue> {
    let state: DuelState = from_value(state).map_err(JsValue::from)?;
    let action: DuelMove = from_value(action).map_err(JsValue::from)?;
    match RuleEngine::new().resolve(&state, player_id, &action) {
        Ok(resolution) => to_value(&resolution).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    state: JsValue,
    player_id: u8,
    difficulty: Option<String>,
    mode: Option<String>,
) -> Result<JsValue, JsValue> {
    let state: DuelState = from_value(state).map_err(JsValue::from)?;
    let adapter = adapter_for(state, difficulty.as_deref());
    let config = agent_config(&adapter, mode.as_deref());
    let decision = MctsAgent::new(config).decide(&adapter, player_id);
    to_value(&decision).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
