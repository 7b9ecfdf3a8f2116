use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IJobRegistry {
        event JobCreated(
            uint256 indexed jobId,
            address indexed employer,
            address indexed agent,
            uint256 reward,
            uint256 stake,
            uint256 fee,
            bytes32 specHash,
            string uri
        );

        function createJob(uint256 reward, uint64 deadline, bytes32 specHash, string uri) external;

        function applyForJob(uint256 jobId, string subdomain, bytes32[] proof) external;

        function submit(
            uint256 jobId,
            bytes32 resultHash,
            string resultURI,
            string subdomain,
            bytes32[] proof
        ) external;

        function finalize(uint256 jobId) external;
    }

    #[sol(rpc)]
    interface IValidationModule {
        function jobNonce(uint256 jobId) external view returns (uint256);

        function commitValidation(
            uint256 jobId,
            bytes32 commitHash,
            string subdomain,
            bytes32[] proof
        ) external;

        function revealValidation(
            uint256 jobId,
            bool approve,
            bytes32 salt,
            string subdomain,
            bytes32[] proof
        ) external;
    }

    #[sol(rpc)]
    interface IStakeManager {
        function stakeOf(address user, uint8 role) external view returns (uint256);

        function depositStake(uint8 role, uint256 amount) external;
    }
}
