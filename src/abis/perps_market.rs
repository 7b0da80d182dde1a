use alloy::sol;

sol! {
    interface IPerpsMarket {
        function getAvailableMargin(address account) external view returns (int256 availableMargin);
    }
}
