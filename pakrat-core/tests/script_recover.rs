use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use pakrat_core::script::{derive_master_key, ScriptDecryptor};
use pakrat_core::xxtea;

#[test]
fn master_key_unmasks_to_ascii() {
    let key = derive_master_key();
    assert_eq!(key.len(), 28);
    assert_eq!(key, b"Xv7!qL2#mZ9$wA4%pR8&nK1*tE5@");
}

/// Round-trip the full pipeline: XXTEA-encrypt Lua source with the master
/// key, base64 it, and let the decryptor take it back apart.
#[test]
fn recovers_lua_source() {
    // length padded to a multiple of four words
    let source = b"local function greet(name)\n    return 'hi ' .. name\nend\nreturn greet\n--pad.\n";
    assert_eq!(source.len() % 4, 0);
    let key = derive_master_key();
    let cipher = xxtea::encrypt_bytes(source, &key).unwrap();
    let body = B64.encode(&cipher);

    let dec = ScriptDecryptor::with_builtin_key();
    let out = dec.decrypt(body.as_bytes()).unwrap().expect("recognized as Lua");
    assert_eq!(out, source);
}

#[test]
fn whitespace_in_base64_body_is_tolerated() {
    let source = b"return 1 --..\n".to_vec();
    assert_eq!(source.len() % 4, 2); // not word-aligned: pad below
    let mut padded = source.clone();
    padded.extend_from_slice(b"--");
    let key = derive_master_key();
    let cipher = xxtea::encrypt_bytes(&padded, &key).unwrap();
    let mut body = B64.encode(&cipher);
    body.insert(8, '\n');
    body.insert(3, ' ');

    let dec = ScriptDecryptor::with_builtin_key();
    let out = dec.decrypt(body.as_bytes()).unwrap().expect("recognized as Lua");
    assert_eq!(out, padded);
}

#[test]
fn bytecode_magic_is_accepted() {
    let mut blob = vec![0x1B, 0x4C, 0x75, 0x61]; // Lua bytecode magic
    blob.extend_from_slice(&[0x00, 0x01, 0x02, 0x03, 0xFF, 0xFE, 0xFD, 0xFC]);
    let key = derive_master_key();
    let cipher = xxtea::encrypt_bytes(&blob, &key).unwrap();
    let body = B64.encode(&cipher);

    let dec = ScriptDecryptor::with_builtin_key();
    let out = dec.decrypt(body.as_bytes()).unwrap().expect("bytecode accepted");
    assert_eq!(out, blob);
}

#[test]
fn non_lua_payloads_fall_through() {
    let dec = ScriptDecryptor::with_builtin_key();
    // not base64 at all
    assert!(dec.decrypt(b"\x00\x01\x02 not base64 \xFF").unwrap().is_none());
    // valid base64 of bytes that decrypt to non-Lua noise
    let body = B64.encode([0xA5u8; 32]);
    assert!(dec.decrypt(body.as_bytes()).unwrap().is_none());
    // too short for the block cipher
    let body = B64.encode([0x11u8; 4]);
    assert!(dec.decrypt(body.as_bytes()).unwrap().is_none());
}

#[test]
fn custom_key_override() {
    let source = b"return 42 --!\n--"; // 16 bytes
    let other_key = b"another-master-key".to_vec();
    let cipher = xxtea::encrypt_bytes(source, &other_key).unwrap();
    let body = B64.encode(&cipher);

    // wrong key: noise, falls through
    let builtin = ScriptDecryptor::with_builtin_key();
    assert!(builtin.decrypt(body.as_bytes()).unwrap().is_none());
    // right key: recovers
    let custom = ScriptDecryptor::with_key(other_key);
    let out = custom.decrypt(body.as_bytes()).unwrap().expect("recognized");
    assert_eq!(out, source);
}
