use alloy::sol;

sol! {
    event AccountCreated(address indexed account, address indexed creator);
}
