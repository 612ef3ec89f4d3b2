use quorum_rpc::{Address, Error, FieldValue, JsonValue, Result, TransactionReceipt, U256, WriteOptions, decode};
use serde::{Deserialize, Serialize};

use super::{ContractKind, ReadSpec, address_arg, into_u64, uint_arg};
use crate::handle::ContractHandle;
use crate::registry::ContractFactory;

/// Governance contract: activation, proposals, votes and abrogation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaoGovernance;

/// Lifecycle state of a proposal, as reported by `state(id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
	/// Created; voting has not opened yet.
	WarmUp,
	/// Voting is open.
	Active,
	/// Withdrawn by its creator.
	Canceled,
	/// Voting closed without quorum or majority.
	Failed,
	/// Voting passed; waiting to be queued.
	Accepted,
	/// Queued; in the timelock.
	Queued,
	/// Executable until the grace period ends.
	Grace,
	/// Grace period ended without execution.
	Expired,
	/// Executed.
	Executed,
	/// Cancelled by a successful abrogation vote.
	Abrogated,
}

impl ProposalState {
	/// Maps the on-chain enum ordinal.
	pub fn from_code(code: u64) -> Result<Self> {
		Ok(match code {
			0 => Self::WarmUp,
			1 => Self::Active,
			2 => Self::Canceled,
			3 => Self::Failed,
			4 => Self::Accepted,
			5 => Self::Queued,
			6 => Self::Grace,
			7 => Self::Expired,
			8 => Self::Executed,
			9 => Self::Abrogated,
			other => return Err(Error::Decode(format!("unknown proposal state {other}"))),
		})
	}

	/// Returns true once the proposal can no longer progress.
	///
	/// An account whose latest proposal is not finished cannot open another.
	pub fn is_finished(self) -> bool {
		matches!(self, Self::Canceled | Self::Executed | Self::Failed | Self::Expired | Self::Abrogated)
	}
}

/// A voter's receipt on a proposal or abrogation proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalReceipt {
	/// Whether the voter has cast a vote.
	pub has_voted: bool,
	/// Voting power used.
	pub votes: U256,
	/// Direction of the vote.
	pub support: bool,
}

impl ProposalReceipt {
	fn from_field(value: &FieldValue) -> Result<Self> {
		match value.as_list() {
			Some([FieldValue::Bool(has_voted), FieldValue::Uint(votes), FieldValue::Bool(support)]) => Ok(Self {
				has_voted: *has_voted,
				votes: *votes,
				support: *support,
			}),
			_ => Err(Error::Decode(format!("expected (bool, uint, bool) receipt, got {value:?}"))),
		}
	}
}

/// Summary of an abrogation proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbrogationProposal {
	/// Account that started the abrogation.
	pub creator: Address,
	/// Creation time, unix seconds.
	pub create_time: u64,
	/// Reason given for the abrogation.
	pub description: String,
	/// Votes in favour.
	pub for_votes: U256,
	/// Votes against.
	pub against_votes: U256,
}

/// Arguments of `propose`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPayload {
	/// Contracts the proposal calls into.
	pub targets: Vec<Address>,
	/// Native value sent with each call.
	pub values: Vec<U256>,
	/// Function signatures, one per target.
	pub signatures: Vec<String>,
	/// Encoded call data, one per target.
	pub calldatas: Vec<String>,
	/// Long-form description.
	pub description: String,
	/// Short title.
	pub title: String,
}

fn decode_receipt(value: JsonValue) -> Result<FieldValue> {
	let [has_voted, votes, support] = decode::tuple::<3>(value)?;
	Ok(FieldValue::List(vec![
		decode::boolean(has_voted)?,
		decode::uint(votes)?,
		decode::boolean(support)?,
	]))
}

fn decode_abrogation(value: JsonValue) -> Result<FieldValue> {
	let [creator, create_time, description, for_votes, against_votes] = decode::tuple::<5>(value)?;
	Ok(FieldValue::List(vec![
		decode::address(creator)?,
		decode::timestamp(create_time)?,
		decode::text(description)?,
		decode::uint(for_votes)?,
		decode::uint(against_votes)?,
	]))
}

impl DaoGovernance {
	/// Field key of the activation flag.
	pub const IS_ACTIVE: &'static str = "is_active";

	/// Registry factory for governance handles.
	pub fn factory() -> ContractFactory {
		super::factory::<Self>()
	}

	/// Cached activation flag.
	pub fn is_active(handle: &ContractHandle) -> Option<bool> {
		handle.bool(Self::IS_ACTIVE)
	}

	/// State of proposal `id`.
	pub async fn proposal_state(handle: &ContractHandle, id: u64) -> Result<ProposalState> {
		let value = handle.call("state", vec![JsonValue::from(id)], decode::uint).await?;
		ProposalState::from_code(into_u64("state", value)?)
	}

	/// Id of the latest proposal created by `account`; 0 if none.
	pub async fn latest_proposal_id(handle: &ContractHandle, account: &Address) -> Result<u64> {
		let value = handle.call("latestProposalIds", vec![address_arg(account)], decode::uint).await?;
		into_u64("latestProposalIds", value)
	}

	/// Whether `account` has a proposal that is still in progress.
	pub async fn has_active_proposal(handle: &ContractHandle, account: &Address) -> Result<bool> {
		let id = Self::latest_proposal_id(handle, account).await?;
		if id == 0 {
			return Ok(false);
		}
		let state = Self::proposal_state(handle, id).await?;
		Ok(!state.is_finished())
	}

	/// Vote receipt of `voter` on proposal `id`.
	pub async fn receipt(handle: &ContractHandle, id: u64, voter: &Address) -> Result<ProposalReceipt> {
		let value = handle
			.call("getReceipt", vec![JsonValue::from(id), address_arg(voter)], decode_receipt)
			.await?;
		ProposalReceipt::from_field(&value)
	}

	/// Abrogation proposal attached to proposal `id`.
	pub async fn abrogation_proposal(handle: &ContractHandle, id: u64) -> Result<AbrogationProposal> {
		let value = handle.call("abrogationProposals", vec![JsonValue::from(id)], decode_abrogation).await?;
		match value.as_list() {
			Some(
				[
					FieldValue::Address(creator),
					FieldValue::Timestamp(create_time),
					FieldValue::Text(description),
					FieldValue::Uint(for_votes),
					FieldValue::Uint(against_votes),
				],
			) => Ok(AbrogationProposal {
				creator: creator.clone(),
				create_time: *create_time,
				description: description.clone(),
				for_votes: *for_votes,
				against_votes: *against_votes,
			}),
			_ => Err(Error::Decode(format!("unexpected abrogation proposal shape {value:?}"))),
		}
	}

	/// Vote receipt of `voter` on the abrogation of proposal `id`.
	pub async fn abrogation_receipt(handle: &ContractHandle, id: u64, voter: &Address) -> Result<ProposalReceipt> {
		let value = handle
			.call("getAbrogationProposalReceipt", vec![JsonValue::from(id), address_arg(voter)], decode_receipt)
			.await?;
		ProposalReceipt::from_field(&value)
	}

	/// Activates governance once the activation threshold is met.
	pub async fn activate(handle: &ContractHandle, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("activate", Vec::new(), options).await
	}

	/// Creates a proposal.
	pub async fn propose(handle: &ContractHandle, payload: &ProposalPayload, options: &WriteOptions) -> Result<TransactionReceipt> {
		let args = vec![
			JsonValue::Array(payload.targets.iter().map(address_arg).collect()),
			JsonValue::Array(payload.values.iter().copied().map(uint_arg).collect()),
			JsonValue::from(payload.signatures.clone()),
			JsonValue::from(payload.calldatas.clone()),
			JsonValue::from(payload.description.clone()),
			JsonValue::from(payload.title.clone()),
		];
		handle.send("propose", args, options).await
	}

	/// Cancels proposal `id`.
	pub async fn cancel_proposal(handle: &ContractHandle, id: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("cancelProposal", vec![JsonValue::from(id)], options).await
	}

	/// Queues accepted proposal `id` for execution.
	pub async fn queue(handle: &ContractHandle, id: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("queue", vec![JsonValue::from(id)], options).await
	}

	/// Executes queued proposal `id`.
	pub async fn execute(handle: &ContractHandle, id: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("execute", vec![JsonValue::from(id)], options).await
	}

	/// Votes on proposal `id`.
	pub async fn cast_vote(handle: &ContractHandle, id: u64, support: bool, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("castVote", vec![JsonValue::from(id), JsonValue::from(support)], options).await
	}

	/// Withdraws the vote on proposal `id`.
	pub async fn cancel_vote(handle: &ContractHandle, id: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("cancelVote", vec![JsonValue::from(id)], options).await
	}

	/// Starts an abrogation of queued proposal `id`.
	pub async fn start_abrogation_proposal(
		handle: &ContractHandle,
		id: u64,
		description: &str,
		options: &WriteOptions,
	) -> Result<TransactionReceipt> {
		handle
			.send("startAbrogationProposal", vec![JsonValue::from(id), JsonValue::from(description)], options)
			.await
	}

	/// Votes on the abrogation of proposal `id`.
	pub async fn abrogation_cast_vote(handle: &ContractHandle, id: u64, support: bool, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle
			.send("abrogationProposal_castVote", vec![JsonValue::from(id), JsonValue::from(support)], options)
			.await
	}

	/// Withdraws the vote on the abrogation of proposal `id`.
	pub async fn abrogation_cancel_vote(handle: &ContractHandle, id: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle
			.send("abrogationProposal_cancelVote", vec![JsonValue::from(id)], options)
			.await
	}
}

impl ContractKind for DaoGovernance {
	fn name(&self) -> &'static str {
		"DAO Governance"
	}

	fn common_reads(&self) -> Vec<ReadSpec> {
		vec![ReadSpec::new(Self::IS_ACTIVE, "isActive", decode::boolean)]
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use pretty_assertions::assert_eq;
	use quorum_rpc::mock::MockTransport;
	use serde_json::json;

	use super::*;
	use crate::test_support::{addr, bound_handle};

	fn governance(transport: &Arc<MockTransport>, account: Option<&str>) -> ContractHandle {
		bound_handle(transport, "0xgov", DaoGovernance::factory(), account)
	}

	#[test]
	fn proposal_state_codes_follow_contract_order() {
		let states: Vec<ProposalState> = (0..=9).map(|c| ProposalState::from_code(c).unwrap()).collect();
		assert_eq!(
			states,
			vec![
				ProposalState::WarmUp,
				ProposalState::Active,
				ProposalState::Canceled,
				ProposalState::Failed,
				ProposalState::Accepted,
				ProposalState::Queued,
				ProposalState::Grace,
				ProposalState::Expired,
				ProposalState::Executed,
				ProposalState::Abrogated,
			]
		);
		assert!(matches!(ProposalState::from_code(10), Err(Error::Decode(_))));
	}

	#[test]
	fn finished_states() {
		let finished: Vec<ProposalState> = (0..=9)
			.map(|c| ProposalState::from_code(c).unwrap())
			.filter(|s| s.is_finished())
			.collect();
		assert_eq!(
			finished,
			vec![
				ProposalState::Canceled,
				ProposalState::Failed,
				ProposalState::Expired,
				ProposalState::Executed,
				ProposalState::Abrogated,
			]
		);
	}

	#[test]
	fn receipt_transform_decodes_tuple() {
		let value = decode_receipt(json!([true, "1500", false])).unwrap();
		assert_eq!(
			ProposalReceipt::from_field(&value).unwrap(),
			ProposalReceipt {
				has_voted: true,
				votes: U256::from(1500),
				support: false,
			}
		);
		assert!(decode_receipt(json!([true, "1500"])).is_err());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn abrogation_proposal_decodes_all_five_outputs() {
		let transport = Arc::new(MockTransport::new());
		transport.respond_with_args(
			&addr("0xgov"),
			"abrogationProposals",
			vec![json!(1)],
			json!(["0xABC", "1700000000", "because", "10", "2"]),
		);
		let handle = governance(&transport, None);

		assert_eq!(
			DaoGovernance::abrogation_proposal(&handle, 1).await,
			Ok(AbrogationProposal {
				creator: addr("0xabc"),
				create_time: 1_700_000_000,
				description: "because".to_string(),
				for_votes: U256::from(10),
				against_votes: U256::from(2),
			})
		);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn abrogation_proposal_rejects_a_short_tuple() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xgov"), "abrogationProposals", json!(["0xabc", "1700000000", "10", "2"]));
		let handle = governance(&transport, None);

		assert!(matches!(
			DaoGovernance::abrogation_proposal(&handle, 1).await,
			Err(Error::Decode(_))
		));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn receipts_are_read_per_proposal_and_voter() {
		let transport = Arc::new(MockTransport::new());
		let gov = addr("0xgov");
		transport.respond_with_args(&gov, "getReceipt", vec![json!(3), json!("0xvoter")], json!([true, "0x3e8", true]));
		transport.respond_with_args(
			&gov,
			"getAbrogationProposalReceipt",
			vec![json!(3), json!("0xvoter")],
			json!([false, "0", false]),
		);
		let handle = governance(&transport, None);
		let voter = addr("0xVoter");

		assert_eq!(
			DaoGovernance::receipt(&handle, 3, &voter).await,
			Ok(ProposalReceipt {
				has_voted: true,
				votes: U256::from(1000),
				support: true,
			})
		);
		assert_eq!(
			DaoGovernance::abrogation_receipt(&handle, 3, &voter).await,
			Ok(ProposalReceipt {
				has_voted: false,
				votes: U256::zero(),
				support: false,
			})
		);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn has_active_proposal_checks_the_latest_state() {
		let transport = Arc::new(MockTransport::new());
		let gov = addr("0xgov");
		transport.respond_with_args(&gov, "latestProposalIds", vec![json!("0xfresh")], json!(0));
		transport.respond_with_args(&gov, "latestProposalIds", vec![json!("0xvoting")], json!(4));
		transport.respond_with_args(&gov, "latestProposalIds", vec![json!("0xdone")], json!(5));
		transport.respond_with_args(&gov, "state", vec![json!(4)], json!(1));
		transport.respond_with_args(&gov, "state", vec![json!(5)], json!("8"));
		let handle = governance(&transport, None);

		assert_eq!(DaoGovernance::has_active_proposal(&handle, &addr("0xfresh")).await, Ok(false));
		assert_eq!(DaoGovernance::has_active_proposal(&handle, &addr("0xvoting")).await, Ok(true));
		assert_eq!(DaoGovernance::has_active_proposal(&handle, &addr("0xdone")).await, Ok(false));
		assert_eq!(DaoGovernance::proposal_state(&handle, 5).await, Ok(ProposalState::Executed));
		assert_eq!(transport.calls_to("state"), 3);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn oversized_proposal_id_is_a_decode_error() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xgov"), "latestProposalIds", json!(U256::MAX.to_string()));
		let handle = governance(&transport, None);

		assert!(matches!(
			DaoGovernance::latest_proposal_id(&handle, &addr("0xuser")).await,
			Err(Error::Decode(_))
		));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn writes_encode_their_arguments() {
		let transport = Arc::new(MockTransport::new());
		let handle = governance(&transport, Some("0xuser"));
		let options = WriteOptions::default();
		let payload = ProposalPayload {
			targets: vec![addr("0xTarget")],
			values: vec![U256::from(5)],
			signatures: vec!["transfer(address,uint256)".to_string()],
			calldatas: vec!["0x00".to_string()],
			description: "pay the team".to_string(),
			title: "Payroll".to_string(),
		};

		DaoGovernance::activate(&handle, &options).await.unwrap();
		DaoGovernance::propose(&handle, &payload, &options).await.unwrap();
		DaoGovernance::cancel_proposal(&handle, 2, &options).await.unwrap();
		DaoGovernance::queue(&handle, 2, &options).await.unwrap();
		DaoGovernance::execute(&handle, 2, &options).await.unwrap();
		DaoGovernance::cast_vote(&handle, 2, true, &options).await.unwrap();
		DaoGovernance::cancel_vote(&handle, 2, &options).await.unwrap();
		DaoGovernance::start_abrogation_proposal(&handle, 2, "stop it", &options).await.unwrap();
		DaoGovernance::abrogation_cast_vote(&handle, 2, false, &options).await.unwrap();
		DaoGovernance::abrogation_cancel_vote(&handle, 2, &options).await.unwrap();

		let calls: Vec<(String, Vec<JsonValue>)> = transport
			.sent()
			.into_iter()
			.map(|tx| (tx.call.method, tx.call.args))
			.collect();
		assert_eq!(
			calls,
			vec![
				("activate".to_string(), vec![]),
				(
					"propose".to_string(),
					vec![
						json!(["0xtarget"]),
						json!(["5"]),
						json!(["transfer(address,uint256)"]),
						json!(["0x00"]),
						json!("pay the team"),
						json!("Payroll"),
					]
				),
				("cancelProposal".to_string(), vec![json!(2)]),
				("queue".to_string(), vec![json!(2)]),
				("execute".to_string(), vec![json!(2)]),
				("castVote".to_string(), vec![json!(2), json!(true)]),
				("cancelVote".to_string(), vec![json!(2)]),
				("startAbrogationProposal".to_string(), vec![json!(2), json!("stop it")]),
				("abrogationProposal_castVote".to_string(), vec![json!(2), json!(false)]),
				("abrogationProposal_cancelVote".to_string(), vec![json!(2)]),
			]
		);
	}
}
