use crate::error::AppError;

/// パスワードに必須の記号
const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";

/// メールアドレスのバリデーション
///
/// 簡易的な形式チェックのみ。実在確認はOTPメールの到達で担保する
pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::validation("email", "メールアドレスは必須です"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::validation(
            "email",
            "有効なメールアドレスを入力してください",
        ));
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AppError::validation(
            "email",
            "有効なメールアドレスを入力してください",
        ));
    }

    Ok(())
}

/// ユーザー名のバリデーション
///
/// 4〜20文字、先頭は英字、以降は英数字とアンダースコアのみ
pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.trim().is_empty() {
        return Err(AppError::validation("username", "ユーザー名は必須です"));
    }

    if username.len() < 4 || username.len() > 20 {
        return Err(AppError::validation(
            "username",
            "ユーザー名は4〜20文字で入力してください",
        ));
    }

    let mut chars = username.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !starts_with_letter || !rest_valid {
        return Err(AppError::validation(
            "username",
            "ユーザー名は英字で始まり、英数字とアンダースコアのみ使用できます",
        ));
    }

    Ok(())
}

/// パスワードのバリデーション
///
/// 12文字以上、英字・数字・記号（@$!%*?&）をそれぞれ1文字以上含むこと
pub fn validate_password(field: &'static str, password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::validation(field, "パスワードは必須です"));
    }

    if password.len() < 12 {
        return Err(AppError::validation(
            field,
            "パスワードは12文字以上で入力してください",
        ));
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c));

    if !has_letter || !has_digit || !has_special {
        return Err(AppError::validation(
            field,
            "パスワードには英字・数字・記号（@$!%*?&）をそれぞれ含めてください",
        ));
    }

    Ok(())
}

/// OTPコードのバリデーション（6桁の数字）
pub fn validate_otp_code(code: &str) -> Result<(), AppError> {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(
            "otp",
            "認証コードは6桁の数字で入力してください",
        ));
    }
    Ok(())
}

/// ユーザー名またはメールアドレスのバリデーション
pub fn validate_username_or_email(value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            "username_or_email",
            "ユーザー名またはメールアドレスは必須です",
        ));
    }
    Ok(())
}

/// 氏名フィールドのバリデーション
pub fn validate_name(field: &'static str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(field, "氏名は必須です"));
    }
    if value.len() > 100 {
        return Err(AppError::validation(
            field,
            "氏名は100文字以内で入力してください",
        ));
    }
    Ok(())
}
