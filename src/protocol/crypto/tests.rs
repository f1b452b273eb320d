mod aes;
