//! Solidity interfaces of the Set protocol contracts driven by the deployment
//! scripts. Only the functions the scripts call are declared.

use alloy::sol;

sol! {
    interface ISetToken {
        function manager() external view returns (address);
        function symbol() external view returns (string memory);
        function getComponents() external view returns (address[] memory);
        function setManager(address manager) external;
    }

    interface IBaseManager {
        function setToken() external view returns (address);
        function operator() external view returns (address);
        function methodologist() external view returns (address);
        function isAdapter(address adapter) external view returns (bool);
        function protectedModules(address module) external view returns (bool);
        function addAdapter(address adapter) external;
        function setOperator(address newOperator) external;
        function setManager(address newManager) external;
        function protectModule(address module, address[] memory adapters) external;
    }

    interface IBaseExtension {
        function manager() external view returns (address);
        function updateCallerStatus(address[] memory callers, bool[] memory statuses) external;
    }

    interface IController {
        function isSystemContract(address contractAddress) external view returns (bool);
        function addModule(address module) external;
    }

    interface IDelegatedManagerFactory {
        function initializeState(address setToken)
            external
            view
            returns (address deployer, address owner, address manager, bool isPending);

        function createManager(
            address setToken,
            address owner,
            address methodologist,
            address[] memory operators,
            address[] memory assets,
            address[] memory extensions
        ) external returns (address);

        function initialize(
            address setToken,
            uint256 ownerFeeSplit,
            address ownerFeeRecipient,
            address[] memory extensions,
            bytes[] memory initializeBytecode
        ) external;
    }

    interface IFeeSplitExtension {
        function operatorFeeSplit() external view returns (uint256);
        function operatorFeeRecipient() external view returns (address);
    }

    interface IGlobalExtension {
        function initializeExtension(address delegatedManager) external;
    }

    interface IGeneralIndexModule {
        function initialize(address setToken) external;
    }

    interface IDebtIssuanceModule {
        function initialize(
            address setToken,
            uint256 maxManagerFee,
            uint256 managerIssueFee,
            uint256 managerRedeemFee,
            address feeRecipient,
            address managerIssuanceHook
        ) external;
    }

    interface IStreamingFeeModule {
        struct FeeState {
            address feeRecipient;
            uint256 maxStreamingFeePercentage;
            uint256 streamingFeePercentage;
            uint256 lastStreamingFeeTimestamp;
        }

        function initialize(address setToken, FeeState memory settings) external;
    }
}
