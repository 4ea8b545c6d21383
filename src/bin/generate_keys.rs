//! Prints a fresh Ed25519 key pair for principal tokens.

use beacon::auth::PrincipalTokens;

fn main() {
    let (private_key, public_key) = PrincipalTokens::generate_key_pair();

    println!("# Keep the private key with the token issuer only.");
    println!("JWT_PRIVATE_KEY={private_key}");
    println!("JWT_PUBLIC_KEY={public_key}");
}
